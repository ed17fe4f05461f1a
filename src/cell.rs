//! Single-threaded shared-access wrapper over [`Scree`].

use core::cell::{RefCell, RefMut};

use crate::Scree;

/// Wraps a [`Scree`] in a [`RefCell`] so multiple handles on one thread can
/// allocate through shared references.
///
/// There is no synchronization involved and the type is deliberately
/// `!Sync`: the allocator's contract of exactly one logical owner stands,
/// this just lets that owner be, say, a request context threaded through
/// several components.
///
/// With the `allocator` feature (on by default) this implements the
/// [`allocator_api2`] `Allocator` trait, making the pool usable as a backing
/// store for `allocator-api2` collections.
pub struct ScreeCell(RefCell<Scree>);

impl ScreeCell {
    /// Wrap an allocator, typically one that has already been
    /// [`init`](Scree::init)ed.
    pub const fn new(scree: Scree) -> Self {
        Self(RefCell::new(scree))
    }

    /// Borrow the inner allocator.
    ///
    /// ### Panics
    /// Panics on reentrant use, i.e. if a borrow is already active.
    pub fn borrow_mut(&self) -> RefMut<'_, Scree> {
        self.0.borrow_mut()
    }

    pub fn into_inner(self) -> Scree {
        self.0.into_inner()
    }
}

impl core::fmt::Debug for ScreeCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ScreeCell").field(&self.0.borrow()).finish()
    }
}

#[cfg(feature = "allocator")]
mod allocator_impl {
    use core::alloc::Layout;
    use core::ptr::NonNull;

    use allocator_api2::alloc::{AllocError, Allocator};

    use super::ScreeCell;
    use crate::GRANULARITY;

    fn slice_ptr(ptr: NonNull<u8>, len: usize) -> NonNull<[u8]> {
        let raw = core::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len);
        // the base pointer is non-null, so the slice pointer is too
        unsafe { NonNull::new_unchecked(raw) }
    }

    fn dangling(layout: Layout) -> NonNull<u8> {
        // layout alignments are nonzero
        unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
    }

    unsafe impl Allocator for ScreeCell {
        fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
            if layout.size() == 0 {
                return Ok(slice_ptr(dangling(layout), 0));
            }
            // the pool only guarantees granularity alignment
            if layout.align() > GRANULARITY {
                return Err(AllocError);
            }

            // SAFETY: the size is nonzero; arena validity is the
            // responsibility of whoever called `Scree::init`.
            let mem = unsafe { self.0.borrow_mut().allocate(layout.size()) };
            mem.map(|ptr| slice_ptr(ptr, layout.size())).ok_or(AllocError)
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            if layout.size() != 0 {
                self.0.borrow_mut().deallocate(ptr, layout.size());
            }
        }
    }
}

#[cfg(all(test, feature = "allocator"))]
mod tests {
    use core::alloc::Layout;

    use allocator_api2::alloc::Allocator;

    use crate::{Scree, ScreeCell, Span, GRANULARITY};

    #[test]
    fn allocator_trait_round_trip() {
        let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice()) as *mut [u8];

        let mut pool = Scree::new();
        unsafe { pool.init(Span::from(arena)) };
        let cell = ScreeCell::new(pool);

        let layout = Layout::from_size_align(100, 8).unwrap();
        let mem = cell.allocate(layout).unwrap();
        assert_eq!(mem.len(), 100);
        unsafe { cell.deallocate(mem.cast(), layout) };

        assert_eq!(cell.borrow_mut().get_stats().memory_used, 0);

        unsafe { drop(Box::from_raw(arena)) };
    }

    #[test]
    fn zero_size_and_overaligned_requests() {
        let arena = Box::leak(vec![0u8; 1 << 12].into_boxed_slice()) as *mut [u8];

        let mut pool = Scree::new();
        unsafe { pool.init(Span::from(arena)) };
        let cell = ScreeCell::new(pool);

        let zero = Layout::from_size_align(0, 16).unwrap();
        let mem = cell.allocate(zero).unwrap();
        assert_eq!(mem.len(), 0);
        unsafe { cell.deallocate(mem.cast(), zero) };

        let overaligned = Layout::from_size_align(64, GRANULARITY * 2).unwrap();
        assert!(cell.allocate(overaligned).is_err());

        unsafe { drop(Box::from_raw(arena)) };
    }

    #[test]
    fn backs_allocator_api2_collections() {
        let arena = Box::leak(vec![0u8; 1 << 16].into_boxed_slice()) as *mut [u8];

        let mut pool = Scree::new();
        unsafe { pool.init(Span::from(arena)) };
        let cell = ScreeCell::new(pool);

        let mut vec = allocator_api2::vec::Vec::with_capacity_in(16, &cell);
        for i in 0..1000u32 {
            vec.push(i);
        }
        assert_eq!(vec.iter().sum::<u32>(), 499_500);
        drop(vec);

        assert_eq!(cell.borrow_mut().get_stats().memory_used, 0);

        unsafe { drop(Box::from_raw(arena)) };
    }
}
