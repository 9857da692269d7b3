//! String buffer - growable UTF-8 text over the allocator capability
//!
//! A thin layer over `Vector<u8>`: every append is valid UTF-8, so the
//! contents can always be viewed as `&str`. Implements `fmt::Write`, which
//! makes it a sink for `write!`.

use core::fmt;
use core::ops::Deref;
use core::str;

use crate::allocator::{AllocError, Allocator, SystemAlloc, SYSTEM};
use crate::vector::Vector;

/// Growable string whose bytes live in an `Allocator`
pub struct StringBuf<'a, A: Allocator = SystemAlloc> {
    bytes: Vector<'a, u8, A>,
}

impl StringBuf<'static, SystemAlloc> {
    pub fn new() -> Self {
        Self::new_in(&SYSTEM)
    }
}

impl Default for StringBuf<'static, SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A: Allocator> StringBuf<'a, A> {
    /// Empty buffer; nothing is allocated until the first append
    pub fn new_in(backing: &'a A) -> Self {
        Self {
            bytes: Vector::new_in(backing),
        }
    }

    /// Buffer holding a copy of `s`, with its storage reserved up front
    #[track_caller]
    pub fn from_str_in(backing: &'a A, s: &str) -> Self {
        let mut buf = Self::new_in(backing);
        buf.bytes.reserve(s.len());
        buf.push_str(s);
        buf
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    #[track_caller]
    pub fn reserve(&mut self, additional: usize) {
        self.bytes.reserve(additional);
    }

    #[track_caller]
    pub fn push(&mut self, c: char) {
        self.push_str(c.encode_utf8(&mut [0; 4]));
    }

    /// Append `s`, terminating on allocation failure
    #[track_caller]
    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn try_push_str(&mut self, s: &str) -> Result<(), AllocError> {
        self.bytes.try_extend_from_slice(s.as_bytes())
    }

    /// Keep capacity, drop contents
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: only whole `str`s are ever appended
        unsafe { str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }
}

impl<'a, A: Allocator> Deref for StringBuf<'a, A> {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<'a, A: Allocator> fmt::Write for StringBuf<'a, A> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.try_push_str(s).map_err(|_| fmt::Error)
    }
}

impl<'a, A: Allocator> fmt::Display for StringBuf<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a, A: Allocator> fmt::Debug for StringBuf<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<'a, 'b, A: Allocator, B: Allocator> PartialEq<StringBuf<'b, B>> for StringBuf<'a, A> {
    fn eq(&self, other: &StringBuf<'b, B>) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<'a, A: Allocator> PartialEq<str> for StringBuf<'a, A> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<'a, A: Allocator> PartialEq<&str> for StringBuf<'a, A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
