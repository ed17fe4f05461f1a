#![no_main]

use arbitrary::Arbitrary;
use core::ptr::NonNull;
use libfuzzer_sys::fuzz_target;
use scree::{Scree, Span};

const ARENA_SIZE: usize = 1 << 20;

#[derive(Debug, Arbitrary)]
enum Action {
    // allocate and stamp the memory
    Alloc { size: u16 },
    // verify the stamp and free
    Free { index: u8 },
    Defragment,
}

fuzz_target!(|actions: Vec<Action>| {
    let arena = Box::leak(vec![0u8; ARENA_SIZE].into_boxed_slice()) as *mut [u8];

    let mut pool = Scree::new();
    unsafe { pool.init(Span::from(arena)) };

    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for action in actions {
        match action {
            Action::Alloc { size } => {
                let size = size as usize + 1;
                if let Some(ptr) = unsafe { pool.allocate(size) } {
                    let stamp = size as u8;
                    unsafe { ptr.as_ptr().write_bytes(stamp, size) };
                    live.push((ptr, size, stamp));
                }
            }
            Action::Free { index } => {
                if !live.is_empty() {
                    let (ptr, size, stamp) = live.swap_remove(index as usize % live.len());
                    for i in 0..size {
                        assert_eq!(unsafe { ptr.as_ptr().add(i).read() }, stamp);
                    }
                    unsafe { pool.deallocate(ptr, size) };
                }
            }
            Action::Defragment => pool.defragment(),
        }
    }

    for (ptr, size, stamp) in live.drain(..) {
        for i in 0..size {
            assert_eq!(unsafe { ptr.as_ptr().add(i).read() }, stamp);
        }
        unsafe { pool.deallocate(ptr, size) };
    }
    assert_eq!(pool.get_stats().memory_used, 0);

    unsafe { drop(Box::from_raw(arena)) };
});
