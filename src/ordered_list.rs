//! The address-ordered, adjacency-merging collector used by the
//! defragmentation pass.
//!
//! Every free region the pool tracks is thrown in here as an individual
//! node, then the whole set is sorted by address and exactly-adjacent ranges
//! are fused in one linear pass.
//!
//! Nodes are intrusive and deliberately tiny: a `(next, size)` pair of
//! 32-bit arena offsets, so a node fits the smallest possible chunk. This is
//! what caps supported arenas below 4 GiB.

use core::ptr::NonNull;

/// Offset sentinel marking the end of the list.
const NONE: u32 = u32::MAX;

/// Node written into the first bytes of each collected region.
#[repr(C)]
#[derive(Clone, Copy)]
struct ListNode {
    next: u32,
    size: u32,
}

#[inline]
unsafe fn node(base: *mut u8, offset: u32) -> *mut ListNode {
    base.add(offset as usize).cast()
}

#[inline]
unsafe fn next_of(base: *mut u8, offset: u32) -> u32 {
    (*node(base, offset)).next
}

#[inline]
unsafe fn set_next(base: *mut u8, offset: u32, next: u32) {
    (*node(base, offset)).next = next;
}

/// In-place merge sort of an offset-linked list, ascending by offset.
/// `len` must be the exact length of the list at `head`.
unsafe fn sort(base: *mut u8, head: u32, len: usize) -> u32 {
    if len <= 1 {
        return head;
    }

    // split off the second half
    let mid = len / 2;
    let mut cur = head;
    for _ in 0..mid - 1 {
        cur = next_of(base, cur);
    }
    let second = next_of(base, cur);
    set_next(base, cur, NONE);

    merge(base, sort(base, head, mid), sort(base, second, len - mid))
}

unsafe fn merge(base: *mut u8, mut a: u32, mut b: u32) -> u32 {
    if a == NONE {
        return b;
    }
    if b == NONE {
        return a;
    }

    let head;
    if a < b {
        head = a;
        a = next_of(base, a);
    } else {
        head = b;
        b = next_of(base, b);
    }

    let mut tail = head;
    while a != NONE && b != NONE {
        if a < b {
            set_next(base, tail, a);
            tail = a;
            a = next_of(base, a);
        } else {
            set_next(base, tail, b);
            tail = b;
            b = next_of(base, b);
        }
    }

    set_next(base, tail, if a != NONE { a } else { b });
    head
}

/// Collects free regions and yields them back merged, in address order.
pub(crate) struct OrderedChunkList {
    base: *mut u8,
    head: u32,
    len: usize,
}

impl OrderedChunkList {
    /// A collector anchored at the arena's base address. Every region added
    /// must lie within that arena.
    pub(crate) fn new(base: *mut u8) -> Self {
        Self { base, head: NONE, len: 0 }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Add the free region `[ptr, ptr + size)` as one node.
    ///
    /// ### Safety
    /// * The region must lie within the anchoring arena and be valid for
    ///   reads and writes of at least one node (8 bytes).
    /// * The region must be disjoint from every region added so far.
    pub(crate) unsafe fn add(&mut self, ptr: NonNull<u8>, size: usize) {
        debug_assert!(size >= core::mem::size_of::<ListNode>());
        debug_assert!(size < NONE as usize);

        let offset = ptr.as_ptr() as usize - self.base as usize;
        debug_assert!(offset < NONE as usize);

        ptr.as_ptr()
            .cast::<ListNode>()
            .write(ListNode { next: self.head, size: size as u32 });
        self.head = offset as u32;
        self.len += 1;
    }

    /// Sort every node by address, fuse exactly-adjacent regions, and yield
    /// each merged region to `f` in ascending address order.
    ///
    /// ### Safety
    /// Nodes must still hold the links written by [`add`](Self::add). Each
    /// yielded region's node is read out before `f` runs, so `f` may reuse
    /// the region immediately.
    pub(crate) unsafe fn merge_and_drain(mut self, mut f: impl FnMut(NonNull<u8>, usize)) {
        self.head = sort(self.base, self.head, self.len);

        let mut offset = self.head;
        while offset != NONE {
            let ListNode { mut next, mut size } = *node(self.base, offset);

            // absorb every immediately-adjacent successor
            while next != NONE && next == offset + size {
                let absorbed = *node(self.base, next);
                size += absorbed.size;
                next = absorbed.next;
            }

            f(
                NonNull::new_unchecked(self.base.add(offset as usize)),
                size as usize,
            );
            offset = next;
        }
    }
}
