//! Allocation statistics for the pool resource.

/// Counters describing the pool's current and historical state.
///
/// Every `allocate`, `deallocate` and `defragment` call keeps these up to
/// date; they are read-only to callers (polled by a reporting layer via
/// [`get_stats`](crate::Scree::get_stats)) and have no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Size of the (granularity-aligned) arena granted at `init`.
    pub memory_limit: usize,
    /// Bytes currently held by callers, counted at their aligned sizes.
    pub memory_used: usize,
    /// High-water mark of `memory_used` since `init`.
    pub max_memory_used: usize,
    /// Bytes of the arena ever consumed by the base bump allocator.
    pub real_memory_used: usize,
    /// High-water mark of `real_memory_used` since `init`.
    pub max_real_memory_used: usize,

    /// Free chunks currently sitting on the per-class free lists.
    pub small_memory_pieces: usize,
    /// Free pieces currently tracked by the huge-piece tree.
    pub huge_memory_pieces: usize,

    /// Defragmentation passes performed since `init`.
    pub defragmentation_calls: u64,
    /// Free bytes swept through the collector by the most recent pass.
    pub last_defragmentation_garbage: usize,
}

impl MemoryStats {
    pub const fn new() -> Self {
        Self {
            memory_limit: 0,
            memory_used: 0,
            max_memory_used: 0,
            real_memory_used: 0,
            max_real_memory_used: 0,
            small_memory_pieces: 0,
            huge_memory_pieces: 0,
            defragmentation_calls: 0,
            last_defragmentation_garbage: 0,
        }
    }

    /// Bytes currently reachable through the free structures and the cursor
    /// reserve, as accounted.
    pub const fn free_bytes(&self) -> usize {
        self.memory_limit - self.memory_used
    }

    pub(crate) fn account_init(&mut self, limit: usize) {
        *self = Self::new();
        self.memory_limit = limit;
    }

    pub(crate) fn account_alloc(&mut self, aligned_size: usize) {
        self.memory_used += aligned_size;
        if self.memory_used > self.max_memory_used {
            self.max_memory_used = self.memory_used;
        }
    }

    pub(crate) fn account_dealloc(&mut self, aligned_size: usize) {
        debug_assert!(self.memory_used >= aligned_size);
        self.memory_used -= aligned_size;
    }

    pub(crate) fn account_real(&mut self, bump_used: usize) {
        self.real_memory_used = bump_used;
        if bump_used > self.max_real_memory_used {
            self.max_real_memory_used = bump_used;
        }
    }

    pub(crate) fn account_defragmentation(&mut self, garbage: usize) {
        self.defragmentation_calls += 1;
        self.last_defragmentation_garbage = garbage;
    }
}
