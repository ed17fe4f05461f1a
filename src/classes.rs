//! The size-class ladder: a pure mapping between request sizes, canonical
//! chunk sizes and free-list indices.
//!
//! The ladder is linear: one class per multiple of the granularity below the
//! huge threshold. The pool's chunk recycling relies on class sizes
//! round-tripping exactly, so no pseudo-logarithmic binning is used.

/// Allocation granularity. Every canonical size is a multiple of this, and
/// every returned pointer is aligned to it.
pub const GRANULARITY: usize = 8;

/// Aligned sizes at or above this are *huge*: they are tracked in the
/// huge-piece tree rather than the per-class free lists.
pub const HUGE_THRESHOLD: usize = 16 * 1024;

/// Number of free-chunk lists, one per class. Index 0 is a sentinel that is
/// never populated, since aligned sizes are always positive.
pub(crate) const CLASS_COUNT: usize = HUGE_THRESHOLD / GRANULARITY;

/// Rounds `size` up to the smallest positive multiple of [`GRANULARITY`],
/// or `None` when the rounding would overflow. Such sizes cannot fit any
/// arena, so callers treat them as plain exhaustion.
#[inline]
pub(crate) const fn align_size(size: usize) -> Option<usize> {
    if size <= GRANULARITY {
        Some(GRANULARITY)
    } else {
        match size.checked_add(GRANULARITY - 1) {
            Some(padded) => Some(padded & !(GRANULARITY - 1)),
            None => None,
        }
    }
}

/// Maps an aligned size to its class index, or `None` for huge sizes.
#[inline]
pub(crate) const fn class_of_size(aligned_size: usize) -> Option<usize> {
    debug_assert!(aligned_size % GRANULARITY == 0 && aligned_size != 0);

    if aligned_size < HUGE_THRESHOLD {
        Some(aligned_size / GRANULARITY)
    } else {
        None
    }
}

/// The canonical chunk size of class `class`.
#[inline]
pub(crate) const fn size_of_class(class: usize) -> usize {
    debug_assert!(class != 0 && class < CLASS_COUNT);

    class * GRANULARITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_alignment() {
        assert_eq!(align_size(0), Some(GRANULARITY));
        assert_eq!(align_size(1), Some(GRANULARITY));
        assert_eq!(align_size(8), Some(8));
        assert_eq!(align_size(9), Some(16));
        assert_eq!(align_size(16), Some(16));
        assert_eq!(align_size(5000), Some(5000));
        assert_eq!(align_size(5001), Some(5008));
    }

    #[test]
    fn unalignable_sizes() {
        assert_eq!(align_size(usize::MAX), None);
        assert_eq!(align_size(usize::MAX - 6), None);
        // the largest aligned size is its own fixpoint
        assert_eq!(align_size(usize::MAX - 7), Some(usize::MAX - 7));
    }

    #[test]
    fn class_round_trips() {
        for class in 1..CLASS_COUNT {
            let size = size_of_class(class);
            assert_eq!(class_of_size(size), Some(class));
            assert_eq!(align_size(size), Some(size));
            // strictly increasing ladder
            if class > 1 {
                assert!(size > size_of_class(class - 1));
            }
        }
    }

    #[test]
    fn huge_boundary() {
        assert_eq!(class_of_size(HUGE_THRESHOLD - GRANULARITY), Some(CLASS_COUNT - 1));
        assert_eq!(class_of_size(HUGE_THRESHOLD), None);
        assert_eq!(class_of_size(HUGE_THRESHOLD + GRANULARITY), None);
    }

    #[test]
    fn sentinel_unreachable() {
        // the smallest aligned size already maps above the sentinel
        assert_eq!(class_of_size(align_size(1).unwrap()), Some(1));
    }
}
