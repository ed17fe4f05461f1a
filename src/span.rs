use core::ops::Range;

use crate::GRANULARITY;

/// Describes a contiguous region of memory, `base..acme`.
///
/// This is how an arena is granted to the allocator. The allocator never
/// allocates or releases the described memory itself; it only manages it.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    base: *mut u8,
    acme: *mut u8,
}

impl Default for Span {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Range<*mut u8>> for Span {
    fn from(value: Range<*mut u8>) -> Self {
        Self { base: value.start, acme: value.end }
    }
}

impl From<*mut [u8]> for Span {
    #[inline]
    fn from(value: *mut [u8]) -> Self {
        Self {
            base: value.cast(),
            acme: value.cast::<u8>().wrapping_add(value.len()),
        }
    }
}

impl From<&mut [u8]> for Span {
    #[inline]
    fn from(value: &mut [u8]) -> Self {
        Self {
            base: value.as_mut_ptr(),
            acme: value.as_mut_ptr().wrapping_add(value.len()),
        }
    }
}

impl PartialEq for Span {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        (self.is_empty() && other.is_empty())
            || (self.base == other.base && self.acme == other.acme)
    }
}
impl Eq for Span {}

impl Span {
    pub const fn empty() -> Self {
        Self { base: core::ptr::null_mut(), acme: core::ptr::null_mut() }
    }

    pub const fn new(base: *mut u8, acme: *mut u8) -> Self {
        Self { base, acme }
    }

    pub fn from_base_size(base: *mut u8, size: usize) -> Self {
        Self { base, acme: base.wrapping_add(size) }
    }

    pub const fn base_ptr(&self) -> *mut u8 {
        self.base
    }
    pub const fn acme_ptr(&self) -> *mut u8 {
        self.acme
    }

    #[inline]
    pub fn size(&self) -> usize {
        if self.acme > self.base {
            self.acme as usize - self.base as usize
        } else {
            0
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base >= self.acme
    }

    /// Returns whether `self` contains the address of `ptr`.
    #[inline]
    pub fn contains_ptr(&self, ptr: *mut u8) -> bool {
        self.base <= ptr && ptr < self.acme
    }

    /// Returns whether some of `self` overlaps some of `other`.
    ///
    /// Empty spans don't overlap with anything.
    pub fn overlaps(&self, other: Span) -> bool {
        if self.is_empty() || other.is_empty() {
            false
        } else {
            !(self.base >= other.acme || other.base >= self.acme)
        }
    }

    /// Aligns `base` upward and `acme` downward to the allocation granularity.
    pub fn word_align_inward(self) -> Self {
        const MASK: usize = GRANULARITY - 1;

        Self {
            base: self.base.wrapping_add(self.base.align_offset(GRANULARITY)),
            acme: self.acme.wrapping_sub(self.acme as usize & MASK),
        }
    }

    /// The base pointer and size, or `None` for empty spans.
    pub fn get_base_size(&self) -> Option<(core::ptr::NonNull<u8>, usize)> {
        if self.is_empty() {
            None
        } else {
            core::ptr::NonNull::new(self.base).map(|base| (base, self.size()))
        }
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{:p}..{:p}", self.base, self.acme))
    }
}
