//! Intrusive free lists of same-class chunks.
//!
//! A freed chunk's first word doubles as the link to the next chunk of its
//! class, so the lists occupy no memory beyond their heads. Reuse is LIFO:
//! the most recently freed chunk is handed out first, which keeps the hot
//! chunk in cache but has no bearing on correctness.

use core::ptr::{null_mut, NonNull};

/// Head of a singly-linked, intrusive free-chunk list.
///
/// ### Safety
/// The list reinterprets freed memory as link storage. Every chunk pushed
/// must remain untouched by anything else until it is popped, otherwise the
/// links are corrupted and traversal becomes memory unsafe.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeChunkList {
    head: *mut u8,
}

impl FreeChunkList {
    pub(crate) const EMPTY: Self = Self { head: null_mut() };

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Push `chunk` onto the head of the list.
    ///
    /// ### Safety
    /// * `chunk` must be valid for reads and writes of at least one word.
    /// * `chunk` must not already be reachable through any free structure.
    #[inline]
    pub(crate) unsafe fn push(&mut self, chunk: NonNull<u8>) {
        chunk.as_ptr().cast::<*mut u8>().write(self.head);
        self.head = chunk.as_ptr();
    }

    /// Pop the most recently pushed chunk, if any.
    ///
    /// ### Safety
    /// Chunks on the list must still hold the links written by `push`.
    #[inline]
    pub(crate) unsafe fn pop(&mut self) -> Option<NonNull<u8>> {
        let chunk = NonNull::new(self.head)?;
        self.head = chunk.as_ptr().cast::<*mut u8>().read();
        Some(chunk)
    }

    /// Iterate the chunk base pointers without unlinking anything.
    ///
    /// ### Safety
    /// The list must remain unmodified for the lifetime of the iterator.
    #[cfg(any(test, debug_assertions))]
    pub(crate) unsafe fn iter(&self) -> Iter {
        Iter { cursor: self.head }
    }
}

/// An iterator over the chunks of a [`FreeChunkList`].
#[cfg(any(test, debug_assertions))]
pub(crate) struct Iter {
    cursor: *mut u8,
}

#[cfg(any(test, debug_assertions))]
impl Iterator for Iter {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = NonNull::new(self.cursor)?;
        self.cursor = unsafe { chunk.as_ptr().cast::<*mut u8>().read() };
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut buffer = [0usize; 8];
        let base = buffer.as_mut_ptr().cast::<u8>();

        let a = NonNull::new(base).unwrap();
        let b = NonNull::new(base.wrapping_add(8)).unwrap();
        let c = NonNull::new(base.wrapping_add(16)).unwrap();

        let mut list = FreeChunkList::EMPTY;
        assert!(list.is_empty());

        unsafe {
            list.push(a);
            list.push(b);
            list.push(c);

            assert!(!list.is_empty());
            assert_eq!(list.pop(), Some(c));
            assert_eq!(list.pop(), Some(b));
            assert_eq!(list.pop(), Some(a));
            assert_eq!(list.pop(), None);
        }

        assert!(list.is_empty());
    }

    #[test]
    fn iter_visits_all() {
        let mut buffer = [0usize; 8];
        let base = buffer.as_mut_ptr().cast::<u8>();

        let mut list = FreeChunkList::EMPTY;
        unsafe {
            for i in 0..4 {
                list.push(NonNull::new(base.wrapping_add(i * 8)).unwrap());
            }

            let seen: Vec<*mut u8> = list.iter().map(|c| c.as_ptr()).collect();
            assert_eq!(seen.len(), 4);
            // the list is untouched by iteration
            assert_eq!(list.pop().unwrap().as_ptr(), base.wrapping_add(24));
        }
    }
}
