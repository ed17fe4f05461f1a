#![cfg_attr(not(any(test, feature = "fuzzing")), no_std)]
#![doc = include_str!("../README.md")]

mod bump;
mod cell;
mod chunk_list;
mod classes;
mod ordered_list;
mod span;
mod stats;
mod tree;
mod utils;

pub use cell::ScreeCell;
pub use classes::{GRANULARITY, HUGE_THRESHOLD};
pub use span::Span;
pub use stats::MemoryStats;

pub(crate) use classes::{size_of_class, CLASS_COUNT};

use core::ptr::NonNull;

use bump::{BumpAllocator, FallbackAllocator};
use chunk_list::FreeChunkList;
use classes::{align_size, class_of_size};
use ordered_list::OrderedChunkList;
use tree::HugePieceTree;
use utils::scan_for_errors;

/// The pool allocator.
///
/// One `Scree` manages one contiguous arena granted through [`init`](Scree::init).
/// Allocation requests are rounded up to the [`GRANULARITY`] and served, in
/// order of preference, from the per-class free lists, from the fallback
/// sub-allocator, from the huge-piece tree (after a defragmentation pass if
/// the first attempt comes up empty) and finally from the arena's untouched
/// suffix. Freed regions are recycled at their exact aligned size with no
/// eager coalescing; [`defragment`](Scree::defragment) merges adjacent free
/// regions in one sweep.
///
/// Returned pointers are aligned to [`GRANULARITY`] bytes, never more.
pub struct Scree {
    pub(crate) arena: Span,
    pub(crate) base: BumpAllocator,
    pub(crate) fallback: FallbackAllocator,
    pub(crate) huge_pieces: HugePieceTree,
    pub(crate) free_chunks: [FreeChunkList; CLASS_COUNT],
    pub(crate) stats: MemoryStats,
}

// the intrusive pointers all target the arena, which moves with the struct
unsafe impl Send for Scree {}

impl core::fmt::Debug for Scree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scree")
            .field("arena", &self.arena)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Default for Scree {
    fn default() -> Self {
        Self::new()
    }
}

impl Scree {
    /// An allocator with no arena. Every allocation fails until
    /// [`init`](Scree::init) grants one.
    pub const fn new() -> Self {
        Self {
            arena: Span::empty(),
            base: BumpAllocator::new(),
            fallback: FallbackAllocator::new(),
            huge_pieces: HugePieceTree::new(),
            free_chunks: [FreeChunkList::EMPTY; CLASS_COUNT],
            stats: MemoryStats::new(),
        }
    }

    /// Grant the arena described by `span`, discarding any previous arena
    /// and all bookkeeping along with it.
    ///
    /// The span is aligned inward to the granularity before use; a span
    /// smaller than one granule leaves the allocator empty. Arenas of
    /// 4 GiB and up are not supported.
    ///
    /// ### Safety
    /// The aligned span must be valid for reads and writes, and must not be
    /// accessed by anything else for as long as this allocator, or any
    /// memory allocated from it, is in use.
    ///
    /// ### Panics
    /// Panics if the span contains the null address or is 4 GiB or larger.
    pub unsafe fn init(&mut self, span: Span) {
        let arena = span.word_align_inward();
        assert!(!arena.contains_ptr(core::ptr::null_mut()), "arena contains null");
        assert!(arena.size() < u32::MAX as usize, "arena too large");

        self.arena = arena;
        self.fallback.clear();
        self.huge_pieces.clear();
        self.free_chunks = [FreeChunkList::EMPTY; CLASS_COUNT];

        match arena.get_base_size() {
            Some((base, size)) => self.base.init(base.as_ptr(), size),
            None => self.base.clear(),
        }
        self.stats.account_init(arena.size());

        scan_for_errors(self);
    }

    /// Allocate `size` bytes, rounded up to the granularity.
    ///
    /// Returns `None` when the request cannot be satisfied even after a
    /// defragmentation pass. The pool is left unchanged in that case apart
    /// from whatever the pass itself merged.
    ///
    /// ### Safety
    /// `size` must be nonzero.
    pub unsafe fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(size != 0);
        // unalignable sizes can't fit any arena; plain exhaustion
        let aligned_size = align_size(size)?;

        let mem = match class_of_size(aligned_size) {
            Some(class) => self.allocate_small(aligned_size, class),
            None => self.allocate_huge(aligned_size),
        };

        if mem.is_some() {
            self.stats.account_alloc(aligned_size);
            self.stats.account_real(self.base.used());
        }
        scan_for_errors(self);
        mem
    }

    /// Return the region `[ptr, ptr + size)` to the pool.
    ///
    /// The freed region is filed at its aligned size, without coalescing.
    ///
    /// ### Safety
    /// `ptr` must have been returned by [`allocate`](Scree::allocate) on this
    /// allocator with the same `size`, and not freed since.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size != 0);
        debug_assert!(self.arena.contains_ptr(ptr.as_ptr()));
        let aligned_size = match align_size(size) {
            Some(aligned_size) => aligned_size,
            // sizes this large never come back from a successful allocate
            None => {
                debug_assert!(false, "deallocate size was never allocatable");
                return;
            }
        };

        self.put_memory_back(ptr, aligned_size);
        self.stats.account_dealloc(aligned_size);
        scan_for_errors(self);
    }

    /// Merge adjacent free regions across all free structures.
    ///
    /// Every free list chunk, every huge piece and the fallback remainder
    /// are collected, sorted by address, fused where exactly adjacent and
    /// filed back at their merged sizes. Memory held by callers is never
    /// touched.
    pub fn defragment(&mut self) {
        // SAFETY: the free structures only ever track regions inside the
        // arena granted at `init`, whose validity the caller upholds.
        unsafe { self.perform_defragmentation() };
        scan_for_errors(self);
    }

    /// Snapshot of the allocation statistics.
    pub fn get_stats(&self) -> MemoryStats {
        self.stats
    }

    /// The aligned arena granted at [`init`](Scree::init).
    pub fn get_arena(&self) -> Span {
        self.arena
    }

    unsafe fn allocate_small(&mut self, aligned_size: usize, class: usize) -> Option<NonNull<u8>> {
        if let Some(mem) = self.try_small(aligned_size, class) {
            return Some(mem);
        }

        self.perform_defragmentation();
        if let Some(mem) = self.try_small(aligned_size, class) {
            return Some(mem);
        }

        self.base.reserve(aligned_size)
    }

    unsafe fn allocate_huge(&mut self, aligned_size: usize) -> Option<NonNull<u8>> {
        if let Some(mem) = self.try_huge(aligned_size) {
            return Some(mem);
        }

        self.perform_defragmentation();
        if let Some(mem) = self.try_huge(aligned_size) {
            return Some(mem);
        }

        self.base.reserve(aligned_size)
    }

    /// One round of the small reuse paths: exact-class chunk, fallback
    /// carve, then a fallback refill from the smallest huge piece.
    unsafe fn try_small(&mut self, aligned_size: usize, class: usize) -> Option<NonNull<u8>> {
        if let Some(chunk) = self.free_chunks[class].pop() {
            self.stats.small_memory_pieces -= 1;
            return Some(chunk);
        }

        if let Some(mem) = self.fallback.get(aligned_size) {
            return Some(mem);
        }

        if let Some((piece, piece_size)) = self.huge_pieces.extract_smallest() {
            self.stats.huge_memory_pieces -= 1;
            self.retire_fallback();
            self.fallback.refill(piece, piece_size);
            // a huge piece always covers a small request
            return self.fallback.get(aligned_size);
        }

        None
    }

    /// Best-fit extraction from the huge-piece tree, filing any surplus
    /// straight back.
    unsafe fn try_huge(&mut self, aligned_size: usize) -> Option<NonNull<u8>> {
        let (piece, piece_size) = self.huge_pieces.extract_fit(aligned_size)?;
        self.stats.huge_memory_pieces -= 1;

        let surplus = piece_size - aligned_size;
        if surplus != 0 {
            self.put_memory_back(
                NonNull::new_unchecked(piece.as_ptr().add(aligned_size)),
                surplus,
            );
        }
        Some(piece)
    }

    /// Reclassify the fallback sub-allocator's unconsumed suffix, leaving it
    /// empty and ready for a refill.
    unsafe fn retire_fallback(&mut self) {
        if let Some((rest, rest_size)) = self.fallback.take_remaining() {
            self.put_memory_back(rest, rest_size);
        }
    }

    /// File the free region `[ptr, ptr + size)` under its class list or the
    /// huge-piece tree.
    ///
    /// ### Safety
    /// The region must lie within the arena, be granularity-aligned in base
    /// and size, and be disjoint from every other free region.
    unsafe fn put_memory_back(&mut self, ptr: NonNull<u8>, size: usize) {
        match class_of_size(size) {
            Some(class) => {
                debug_assert!(class != 0);
                self.free_chunks[class].push(ptr);
                self.stats.small_memory_pieces += 1;
            }
            None => {
                self.huge_pieces.insert(ptr, size);
                self.stats.huge_memory_pieces += 1;
            }
        }
    }

    unsafe fn perform_defragmentation(&mut self) {
        let mut list = OrderedChunkList::new(self.base.base_ptr());

        self.huge_pieces.flush_to(&mut list);
        if let Some((rest, rest_size)) = self.fallback.take_remaining() {
            list.add(rest, rest_size);
        }
        for class in 1..CLASS_COUNT {
            let chunk_size = size_of_class(class);
            while let Some(chunk) = self.free_chunks[class].pop() {
                list.add(chunk, chunk_size);
            }
        }

        // everything is in the collector now; the counters are rebuilt as
        // the merged regions get filed back
        self.stats.small_memory_pieces = 0;
        self.stats.huge_memory_pieces = 0;

        let mut garbage = 0;
        list.merge_and_drain(|ptr, size| {
            garbage += size;
            self.put_memory_back(ptr, size);
        });

        self.stats.account_defragmentation(garbage);
    }
}
