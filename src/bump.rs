//! The bump-pointer base layer, and the fallback sub-allocator the pool
//! carves out of one huge piece at a time.

use core::ptr::{null_mut, NonNull};

use crate::classes::GRANULARITY;

/// Hands out virgin memory by advancing a cursor over a borrowed buffer.
///
/// The cursor only ever moves forward; individual reservations cannot be
/// undone. Reclamation is the pool's business.
#[derive(Debug)]
pub(crate) struct BumpAllocator {
    base: *mut u8,
    cursor: *mut u8,
    end: *mut u8,
}

impl BumpAllocator {
    pub(crate) const fn new() -> Self {
        Self { base: null_mut(), cursor: null_mut(), end: null_mut() }
    }

    /// Reset the cursor over a fresh region.
    ///
    /// ### Safety
    /// `[base, base + size)` must be valid for reads and writes for as long
    /// as this allocator, or any memory reserved from it, is in use. `base`
    /// must be aligned to the granularity and `size` a multiple of it.
    pub(crate) unsafe fn init(&mut self, base: *mut u8, size: usize) {
        debug_assert!(base as usize % GRANULARITY == 0);
        debug_assert!(size % GRANULARITY == 0);

        self.base = base;
        self.cursor = base;
        self.end = base.add(size);
    }

    /// Forget the current region; every subsequent reservation fails.
    pub(crate) fn clear(&mut self) {
        self.base = null_mut();
        self.cursor = null_mut();
        self.end = null_mut();
    }

    /// Reserve `aligned_size` bytes by advancing the cursor, or fail without
    /// side effects.
    #[inline]
    pub(crate) fn reserve(&mut self, aligned_size: usize) -> Option<NonNull<u8>> {
        debug_assert!(aligned_size != 0 && aligned_size % GRANULARITY == 0);

        if self.remaining() >= aligned_size {
            let mem = self.cursor;
            self.cursor = self.cursor.wrapping_add(aligned_size);
            NonNull::new(mem)
        } else {
            None
        }
    }

    /// Bytes between the cursor and the end of the region.
    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.end as usize - self.cursor as usize
    }

    /// The cursor: base of the unused suffix.
    #[inline]
    pub(crate) fn current(&self) -> *mut u8 {
        self.cursor
    }

    /// Bytes consumed since `init`.
    #[inline]
    pub(crate) fn used(&self) -> usize {
        self.cursor as usize - self.base as usize
    }

    /// Base of the region granted at `init`, null if cleared.
    #[inline]
    pub(crate) fn base_ptr(&self) -> *mut u8 {
        self.base
    }
}

/// A second bump allocator, always carved from exactly one huge piece (or
/// empty). Small allocations are served from it without churning the tree.
#[derive(Debug)]
pub(crate) struct FallbackAllocator(BumpAllocator);

impl FallbackAllocator {
    pub(crate) const fn new() -> Self {
        Self(BumpAllocator::new())
    }

    /// Carve `aligned_size` bytes off the loaned piece, if enough remains.
    #[inline]
    pub(crate) fn get(&mut self, aligned_size: usize) -> Option<NonNull<u8>> {
        self.0.reserve(aligned_size)
    }

    /// Replace the loaned region with a fresh huge piece.
    ///
    /// The previous region's suffix must have been reclaimed through
    /// [`take_remaining`](Self::take_remaining) first.
    ///
    /// ### Safety
    /// Same contract as [`BumpAllocator::init`].
    pub(crate) unsafe fn refill(&mut self, piece: NonNull<u8>, size: usize) {
        debug_assert!(self.0.remaining() == 0);

        self.0.init(piece.as_ptr(), size);
    }

    /// Hand back the unconsumed suffix, leaving the sub-allocator empty.
    ///
    /// Returns `None` if the region was fully consumed (or never set); the
    /// caller reclassifies the returned region through its deallocation path.
    pub(crate) fn take_remaining(&mut self) -> Option<(NonNull<u8>, usize)> {
        let rest_size = self.0.remaining();
        let rest = NonNull::new(self.0.current());
        self.0.clear();

        match (rest, rest_size) {
            (Some(rest), 1..) => Some((rest, rest_size)),
            _ => None,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    /// Unconsumed bytes of the loaned piece.
    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.0.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advances() {
        let mut buffer = [0u64; 16];
        let base = buffer.as_mut_ptr().cast::<u8>();

        let mut bump = BumpAllocator::new();
        assert_eq!(bump.reserve(8), None);

        unsafe { bump.init(base, 128) };
        assert_eq!(bump.remaining(), 128);
        assert_eq!(bump.used(), 0);

        let a = bump.reserve(48).unwrap();
        let b = bump.reserve(80).unwrap();
        assert_eq!(a.as_ptr(), base);
        assert_eq!(b.as_ptr(), base.wrapping_add(48));
        assert_eq!(bump.remaining(), 0);
        assert_eq!(bump.used(), 128);

        // exhausted, with no side effects on failure
        assert_eq!(bump.reserve(8), None);
        assert_eq!(bump.current(), base.wrapping_add(128));
    }

    #[test]
    fn reserve_does_not_overcommit() {
        let mut buffer = [0u64; 4];
        let mut bump = BumpAllocator::new();
        unsafe { bump.init(buffer.as_mut_ptr().cast(), 32) };

        assert!(bump.reserve(40).is_none());
        assert_eq!(bump.remaining(), 32);
        assert!(bump.reserve(32).is_some());
    }

    #[test]
    fn fallback_retirement() {
        let mut buffer = [0u64; 16];
        let base = buffer.as_mut_ptr().cast::<u8>();

        let mut fallback = FallbackAllocator::new();
        assert_eq!(fallback.get(8), None);
        assert_eq!(fallback.take_remaining(), None);

        unsafe { fallback.refill(NonNull::new(base).unwrap(), 128) };
        let mem = fallback.get(40).unwrap();
        assert_eq!(mem.as_ptr(), base);

        let (rest, rest_size) = fallback.take_remaining().unwrap();
        assert_eq!(rest.as_ptr(), base.wrapping_add(40));
        assert_eq!(rest_size, 88);

        // retired: empty until the next refill
        assert_eq!(fallback.remaining(), 0);
        assert_eq!(fallback.get(8), None);
        assert_eq!(fallback.take_remaining(), None);
    }
}
