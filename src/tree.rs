//! The size-ordered tree of huge free pieces.
//!
//! Free regions too large for the chunk classes are tracked here, keyed
//! primarily by size and secondarily by address. Nodes are intrusive: a
//! three-word header written into the tracked region itself, so the tree
//! needs no storage of its own.
//!
//! The balancing discipline is a treap whose priorities are derived by
//! hashing each node's address. Nothing extra is stored per node, the shape
//! is deterministic for a given set of addresses, and expected depth stays
//! logarithmic.

use core::ptr::{null_mut, NonNull};

use crate::ordered_list::OrderedChunkList;

/// Node header occupying the first bytes of a tracked free region.
#[repr(C)]
struct TreeNode {
    left: *mut TreeNode,
    right: *mut TreeNode,
    size: usize,
}

/// A location holding a child (or root) pointer.
type Link = *mut TreeNode;

/// Treap priority. Fibonacci hashing scrambles arena offsets well enough
/// that insertion order doesn't degenerate the shape.
#[inline]
fn priority(node: *mut TreeNode) -> usize {
    (node as usize).wrapping_mul(0x9E37_79B9_7F4A_7C15_u64 as usize)
}

/// Returns whether `a` orders before `b`: by size, then by address.
///
/// The address tie-break keeps equal-sized pieces in a deterministic order;
/// extraction semantics don't depend on it.
#[inline]
unsafe fn orders_before(a: *mut TreeNode, b: *mut TreeNode) -> bool {
    match ((*a).size, (*b).size) {
        (x, y) if x != y => x < y,
        _ => (a as usize) < (b as usize),
    }
}

/// Rotate the subtree at `link` right: its left child becomes the root.
unsafe fn rotate_right(link: *mut Link) {
    let root = *link;
    let pivot = (*root).left;
    (*root).left = (*pivot).right;
    (*pivot).right = root;
    *link = pivot;
}

/// Rotate the subtree at `link` left: its right child becomes the root.
unsafe fn rotate_left(link: *mut Link) {
    let root = *link;
    let pivot = (*root).right;
    (*root).right = (*pivot).left;
    (*pivot).left = root;
    *link = pivot;
}

unsafe fn insert_at(link: *mut Link, node: *mut TreeNode) {
    let cur = *link;
    if cur.is_null() {
        *link = node;
        return;
    }

    if orders_before(node, cur) {
        insert_at(&mut (*cur).left, node);
        if priority((*cur).left) > priority(cur) {
            rotate_right(link);
        }
    } else {
        insert_at(&mut (*cur).right, node);
        if priority((*cur).right) > priority(cur) {
            rotate_left(link);
        }
    }
}

/// Find the smallest node of at least `min_size` bytes and detach it.
unsafe fn extract_fit_at(link: *mut Link, min_size: usize) -> Option<*mut TreeNode> {
    let cur = *link;
    if cur.is_null() {
        return None;
    }

    if (*cur).size < min_size {
        return extract_fit_at(&mut (*cur).right, min_size);
    }

    // `cur` fits; anything smaller that still fits is in its left subtree
    if let Some(best) = extract_fit_at(&mut (*cur).left, min_size) {
        return Some(best);
    }

    unlink_at(link);
    Some(cur)
}

/// Detach the node at `link`, rotating it down until a missing child lets it
/// drop out. Heap order among the remaining nodes is preserved.
unsafe fn unlink_at(mut link: *mut Link) {
    loop {
        let node = *link;
        let (left, right) = ((*node).left, (*node).right);

        if left.is_null() {
            *link = right;
            return;
        }
        if right.is_null() {
            *link = left;
            return;
        }

        if priority(left) > priority(right) {
            rotate_right(link);
            link = &mut (**link).right;
        } else {
            rotate_left(link);
            link = &mut (**link).left;
        }
    }
}

unsafe fn drain(node: *mut TreeNode, list: &mut OrderedChunkList) {
    if node.is_null() {
        return;
    }

    // the collector reuses the node's first bytes, so read everything first
    let TreeNode { left, right, size } = node.read();
    list.add(NonNull::new_unchecked(node.cast()), size);

    drain(left, list);
    drain(right, list);
}

#[cfg(any(test, debug_assertions))]
unsafe fn visit(node: *mut TreeNode, f: &mut impl FnMut(NonNull<u8>, usize)) {
    if node.is_null() {
        return;
    }

    visit((*node).left, f);
    f(NonNull::new_unchecked(node.cast()), (*node).size);
    visit((*node).right, f);
}

/// A size-ordered search structure over disjoint huge free regions.
#[derive(Debug)]
pub(crate) struct HugePieceTree {
    root: Link,
}

impl HugePieceTree {
    pub(crate) const fn new() -> Self {
        Self { root: null_mut() }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Drop every entry without touching the tracked memory.
    pub(crate) fn clear(&mut self) {
        self.root = null_mut();
    }

    /// Begin tracking the free region `[base, base + size)`.
    ///
    /// ### Safety
    /// * The region must be valid for reads and writes, granularity-aligned,
    ///   and large enough to hold a node header.
    /// * The region must be disjoint from every other tracked free region.
    pub(crate) unsafe fn insert(&mut self, base: NonNull<u8>, size: usize) {
        debug_assert!(size >= core::mem::size_of::<TreeNode>());
        debug_assert!(base.as_ptr() as usize % core::mem::align_of::<TreeNode>() == 0);

        let node = base.as_ptr().cast::<TreeNode>();
        node.write(TreeNode { left: null_mut(), right: null_mut(), size });
        insert_at(&mut self.root, node);
    }

    /// Remove and return the smallest tracked piece.
    ///
    /// ### Safety
    /// Tracked regions must still hold the headers written by `insert`.
    pub(crate) unsafe fn extract_smallest(&mut self) -> Option<(NonNull<u8>, usize)> {
        let mut link: *mut Link = &mut self.root;
        if (*link).is_null() {
            return None;
        }

        while !(**link).left.is_null() {
            link = &mut (**link).left;
        }

        // the leftmost node has no left child: replacing it with its right
        // subtree keeps both the key order and the heap order intact
        let node = *link;
        *link = (*node).right;
        Some((NonNull::new_unchecked(node.cast()), (*node).size))
    }

    /// Remove and return the smallest piece of at least `min_size` bytes.
    ///
    /// ### Safety
    /// Tracked regions must still hold the headers written by `insert`.
    pub(crate) unsafe fn extract_fit(&mut self, min_size: usize) -> Option<(NonNull<u8>, usize)> {
        let node = extract_fit_at(&mut self.root, min_size)?;
        Some((NonNull::new_unchecked(node.cast()), (*node).size))
    }

    /// Drain every piece into the defragmentation collector, emptying the
    /// tree. Entry order is irrelevant; the collector sorts by address.
    ///
    /// ### Safety
    /// Tracked regions must still hold the headers written by `insert`, and
    /// must lie within the arena `list` is anchored to.
    pub(crate) unsafe fn flush_to(&mut self, list: &mut OrderedChunkList) {
        let root = core::mem::replace(&mut self.root, null_mut());
        drain(root, list);
    }

    /// Visit every piece in (size, address) order.
    ///
    /// ### Safety
    /// Tracked regions must still hold the headers written by `insert`.
    #[cfg(any(test, debug_assertions))]
    pub(crate) unsafe fn for_each(&self, f: &mut impl FnMut(NonNull<u8>, usize)) {
        visit(self.root, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(buffer: &mut [u64], offset: usize) -> NonNull<u8> {
        NonNull::new(buffer.as_mut_ptr().cast::<u8>().wrapping_add(offset)).unwrap()
    }

    #[test]
    fn extract_smallest_orders_by_size() {
        let mut buffer = [0u64; 400];

        let mut tree = HugePieceTree::new();
        unsafe {
            assert_eq!(tree.extract_smallest(), None);

            tree.insert(region(&mut buffer, 0), 800);
            tree.insert(region(&mut buffer, 800), 200);
            tree.insert(region(&mut buffer, 1000), 500);
            assert!(!tree.is_empty());

            assert_eq!(tree.extract_smallest().unwrap().1, 200);
            assert_eq!(tree.extract_smallest().unwrap().1, 500);
            assert_eq!(tree.extract_smallest().unwrap().1, 800);
            assert_eq!(tree.extract_smallest(), None);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn extract_fit_is_best_fit() {
        let mut buffer = [0u64; 1024];

        let mut tree = HugePieceTree::new();
        unsafe {
            tree.insert(region(&mut buffer, 0), 1000);
            tree.insert(region(&mut buffer, 1000), 3000);
            tree.insert(region(&mut buffer, 4000), 2000);

            assert_eq!(tree.extract_fit(4000), None);

            let (_, size) = tree.extract_fit(1500).unwrap();
            assert_eq!(size, 2000);

            let (_, size) = tree.extract_fit(8).unwrap();
            assert_eq!(size, 1000);

            let (_, size) = tree.extract_fit(3000).unwrap();
            assert_eq!(size, 3000);

            assert_eq!(tree.extract_fit(8), None);
        }
    }

    #[test]
    fn equal_sizes_tie_break_by_address() {
        let mut buffer = [0u64; 64];
        let low = region(&mut buffer, 0);
        let high = region(&mut buffer, 256);

        let mut tree = HugePieceTree::new();
        unsafe {
            tree.insert(high, 256);
            tree.insert(low, 256);

            let mut seen = Vec::new();
            tree.for_each(&mut |base, size| seen.push((base.as_ptr() as usize, size)));
            assert_eq!(seen.len(), 2);
            assert!(seen[0].0 < seen[1].0);

            // both still extractable
            assert_eq!(tree.extract_smallest().unwrap().0, low);
            assert_eq!(tree.extract_smallest().unwrap().0, high);
        }
    }

    #[test]
    fn randomized_extraction_is_sorted() {
        const PIECES: usize = 128;
        let mut buffer = vec![0u64; PIECES * 16];
        let rng = fastrand::Rng::with_seed(0x5c4ee);

        let mut tree = HugePieceTree::new();
        let mut sizes = Vec::new();
        unsafe {
            for i in 0..PIECES {
                let size = 32 + 8 * rng.usize(0..12);
                tree.insert(region(&mut buffer, i * 128), size);
                sizes.push(size);
            }
            sizes.sort_unstable();

            for expected in sizes {
                assert_eq!(tree.extract_smallest().unwrap().1, expected);
            }
            assert!(tree.is_empty());
        }
    }

    #[test]
    fn flush_empties_the_tree() {
        let mut buffer = [0u64; 128];
        let base = buffer.as_mut_ptr().cast::<u8>();

        let mut tree = HugePieceTree::new();
        unsafe {
            tree.insert(region(&mut buffer, 576), 256);
            tree.insert(region(&mut buffer, 0), 512);

            let mut list = OrderedChunkList::new(base);
            tree.flush_to(&mut list);
            assert!(tree.is_empty());

            let mut drained = Vec::new();
            list.merge_and_drain(|ptr, size| drained.push((ptr.as_ptr() as usize, size)));
            assert_eq!(
                drained,
                vec![(base as usize, 512), (base as usize + 576, 256)]
            );
        }
    }
}
