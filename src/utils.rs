//! Debug-time validation of the pool's global invariants.

use crate::*;

#[cfg(not(debug_assertions))]
pub(crate) fn scan_for_errors(_: &Scree) {}

/// Debugging function for checking various assumptions.
///
/// Walks every free structure and asserts, after each mutating operation:
/// the sentinel class is empty, the piece counters agree with the stats
/// block, every tracked region lies in the arena, and byte conservation
/// holds. Under test/fuzzing builds it additionally checks that no two
/// tracked free regions overlap.
#[cfg(debug_assertions)]
pub(crate) fn scan_for_errors(pool: &Scree) {
    #[cfg(any(test, feature = "fuzzing"))]
    let mut regions = std::vec::Vec::<(usize, usize)>::new();
    #[cfg(any(test, feature = "fuzzing"))]
    let mut note = |base: usize, size: usize| {
        for &(other_base, other_size) in &regions {
            assert!(
                base + size <= other_base || other_base + other_size <= base,
                "tracked free regions overlap: {base:#x}+{size} vs {other_base:#x}+{other_size}"
            );
        }
        regions.push((base, size));
    };

    // the sentinel class never holds a chunk
    assert!(pool.free_chunks[0].is_empty());

    let mut small_pieces = 0usize;
    let mut free_bytes = 0usize;

    for class in 1..CLASS_COUNT {
        let chunk_size = size_of_class(class);
        unsafe {
            for chunk in pool.free_chunks[class].iter() {
                small_pieces += 1;
                free_bytes += chunk_size;
                assert!(pool.arena.contains_ptr(chunk.as_ptr()));

                #[cfg(any(test, feature = "fuzzing"))]
                note(chunk.as_ptr() as usize, chunk_size);
            }
        }
    }

    let mut huge_pieces = 0usize;
    unsafe {
        pool.huge_pieces.for_each(&mut |base, size| {
            huge_pieces += 1;
            free_bytes += size;
            assert!(size >= HUGE_THRESHOLD);
            assert!(pool.arena.contains_ptr(base.as_ptr()));

            #[cfg(any(test, feature = "fuzzing"))]
            note(base.as_ptr() as usize, size);
        });
    }

    assert!(small_pieces == pool.stats.small_memory_pieces);
    assert!(huge_pieces == pool.stats.huge_memory_pieces);

    // conservation: every byte not held by a caller is reachable through
    // exactly one free structure or the cursor reserve
    free_bytes += pool.fallback.remaining();
    free_bytes += pool.base.remaining();
    assert!(
        free_bytes == pool.stats.memory_limit - pool.stats.memory_used,
        "conservation violated: tracked {} free bytes, expected {}",
        free_bytes,
        pool.stats.memory_limit - pool.stats.memory_used,
    );
}
