//! Memory request descriptor
//!
//! A `Layout` is a `(size, align)` pair. Alignment is always a power of two;
//! the fallible constructors reject anything else and the `_or_abort` forms
//! treat it as a contract violation.

use core::fmt;
use core::mem;

use super::AllocError;

/// Size and alignment of a memory request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    size: usize,
    align: usize,
}

impl Layout {
    /// Create a layout, validating that `align` is a power of two
    #[inline]
    pub const fn from_size_align(size: usize, align: usize) -> Result<Self, AllocError> {
        if align.is_power_of_two() {
            Ok(Self { size, align })
        } else {
            Err(AllocError::InvalidAlignment { align })
        }
    }

    /// Create a layout, terminating on an invalid alignment
    #[inline]
    #[track_caller]
    pub fn from_size_align_or_abort(size: usize, align: usize) -> Self {
        match Self::from_size_align(size, align) {
            Ok(layout) => layout,
            Err(err) => fatal!("invalid layout: {}", err),
        }
    }

    /// Layout of a single `T`
    #[inline]
    pub const fn new<T>() -> Self {
        Self {
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
        }
    }

    /// Layout of `[T; count]`, checking the size for overflow
    #[inline]
    pub const fn array<T>(count: usize) -> Result<Self, AllocError> {
        match mem::size_of::<T>().checked_mul(count) {
            Some(size) => Ok(Self {
                size,
                align: mem::align_of::<T>(),
            }),
            None => Err(AllocError::ArithmeticOverflow),
        }
    }

    /// Requested size in bytes
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Requested alignment in bytes (power of two)
    #[inline]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Same size, alignment raised to at least `align`
    #[inline]
    pub fn align_to(&self, align: usize) -> Result<Self, AllocError> {
        Self::from_size_align(self.size, self.align.max(align))
    }

    /// Convert to the standard library's layout (which additionally bounds
    /// the rounded size by `isize::MAX`)
    #[inline]
    pub fn to_std(&self) -> Result<std::alloc::Layout, AllocError> {
        std::alloc::Layout::from_size_align(self.size, self.align)
            .map_err(|_| AllocError::ArithmeticOverflow)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes (align {})", self.size, self.align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_alignments_accepted() {
        for align in [1, 2, 4, 8, 16, 4096] {
            let layout = Layout::from_size_align(24, align).expect("valid layout");
            assert_eq!(layout.size(), 24);
            assert_eq!(layout.align(), align);
        }
    }

    #[test]
    fn invalid_alignments_rejected() {
        for align in [0, 3, 6, 12, 100] {
            assert_eq!(
                Layout::from_size_align(8, align),
                Err(AllocError::InvalidAlignment { align })
            );
        }
    }

    #[test]
    #[should_panic(expected = "invalid layout")]
    fn invalid_alignment_is_fatal_on_abort_path() {
        Layout::from_size_align_or_abort(8, 24);
    }

    #[test]
    fn typed_layouts() {
        assert_eq!(Layout::new::<u64>(), Layout::from_size_align(8, 8).unwrap());
        assert_eq!(Layout::array::<u32>(10).unwrap().size(), 40);
        assert_eq!(Layout::array::<u32>(10).unwrap().align(), 4);
        assert_eq!(Layout::array::<u64>(usize::MAX), Err(AllocError::ArithmeticOverflow));
    }

    #[test]
    fn align_to_only_raises() {
        let layout = Layout::from_size_align(10, 8).unwrap();
        assert_eq!(layout.align_to(4).unwrap().align(), 8);
        assert_eq!(layout.align_to(32).unwrap().align(), 32);
    }

    #[test]
    fn display_format() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        assert_eq!(layout.to_string(), "64 bytes (align 16)");
    }
}
