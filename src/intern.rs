//! String interning - one canonical copy per distinct content
//!
//! Design: an arena holds the bytes, a hash table maps content to the arena
//! copy. Comparing two interned strings is then a pointer comparison.
//! Interned data lives exactly as long as the interner.

use core::cell::RefCell;
use core::fmt;
use core::ptr::{self, NonNull};
use core::slice;
use core::str;

use crate::allocator::{AllocError, Allocator, Arena, Layout, SystemAlloc, SYSTEM};
use crate::logging::log_interned;
use crate::table::{hash_bytes, HashTable, KeyOps};

/// Borrowed view of bytes used as a table key
///
/// Stored keys always point into the interner's arena; probe keys point at
/// the caller's bytes for the duration of a lookup.
#[derive(Clone, Copy)]
struct ByteKey {
    ptr: NonNull<u8>,
    len: usize,
}

impl ByteKey {
    #[inline]
    fn new(bytes: &[u8]) -> Self {
        Self {
            // SAFETY: slice pointers are never null
            ptr: unsafe { NonNull::new_unchecked(bytes.as_ptr() as *mut u8) },
            len: bytes.len(),
        }
    }

    /// # Safety
    /// The viewed bytes must still be alive
    #[inline]
    unsafe fn as_bytes<'x>(&self) -> &'x [u8] {
        slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }
}

/// Content hashing for `ByteKey`
struct ByteKeyOps;

impl KeyOps<ByteKey> for ByteKeyOps {
    #[inline]
    fn hash(key: &ByteKey) -> u64 {
        // SAFETY: keys in the table point into the arena, probe keys at live
        // caller data
        hash_bytes(unsafe { key.as_bytes() })
    }

    #[inline]
    fn equals(a: &ByteKey, b: &ByteKey) -> bool {
        // SAFETY: as above
        a.len == b.len && unsafe { a.as_bytes() == b.as_bytes() }
    }
}

/// String interner composed of one arena and one hash table
pub struct Interner<'a, A: Allocator = SystemAlloc> {
    arena: Arena<'a, A>,
    table: RefCell<HashTable<'a, ByteKey, NonNull<u8>, ByteKeyOps, A>>,
}

impl Interner<'static, SystemAlloc> {
    #[track_caller]
    pub fn new() -> Self {
        Self::new_in(&SYSTEM)
    }
}

impl Default for Interner<'static, SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A: Allocator> Interner<'a, A> {
    /// Interner whose arena chunks and table both come from `backing`
    #[track_caller]
    pub fn new_in(backing: &'a A) -> Self {
        match Self::try_new_in(backing) {
            Ok(interner) => interner,
            Err(err) => fatal!("interner create failed: {}", err),
        }
    }

    pub fn try_new_in(backing: &'a A) -> Result<Self, AllocError> {
        Ok(Self {
            arena: Arena::with_backing(backing),
            table: RefCell::new(HashTable::try_new_in(backing)?),
        })
    }

    /// Canonical copy of `s`; equal content always yields the same pointer
    #[track_caller]
    pub fn intern(&self, s: &str) -> &str {
        let bytes = self.intern_bytes(s.as_bytes());
        // SAFETY: the canonical bytes equal `s`, which is UTF-8
        unsafe { str::from_utf8_unchecked(bytes) }
    }

    #[track_caller]
    pub fn intern_bytes(&self, bytes: &[u8]) -> &[u8] {
        match self.try_intern_bytes(bytes) {
            Ok(canonical) => canonical,
            Err(err) => fatal!("interning {} bytes failed: {}", bytes.len(), err),
        }
    }

    pub fn try_intern(&self, s: &str) -> Result<&str, AllocError> {
        let bytes = self.try_intern_bytes(s.as_bytes())?;
        // SAFETY: as in `intern`
        Ok(unsafe { str::from_utf8_unchecked(bytes) })
    }

    pub fn try_intern_bytes(&self, bytes: &[u8]) -> Result<&[u8], AllocError> {
        let mut table = self.table.borrow_mut();
        if let Some(&canonical) = table.get_ref(&ByteKey::new(bytes)) {
            // SAFETY: canonical copies live in the arena for `&self`
            return Ok(unsafe { slice::from_raw_parts(canonical.as_ptr(), bytes.len()) });
        }

        let copy = self
            .arena
            .try_alloc_layout(Layout::array::<u8>(bytes.len())?)?;
        // SAFETY: `copy` is a fresh arena block of `bytes.len()` bytes
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), copy.as_ptr(), bytes.len()) };

        let key = ByteKey {
            ptr: copy,
            len: bytes.len(),
        };
        table.try_put(key, copy)?;
        log_interned(bytes.len(), table.len());

        // SAFETY: as above
        Ok(unsafe { slice::from_raw_parts(copy.as_ptr(), bytes.len()) })
    }

    /// Canonical copy of `s` if it has been interned
    pub fn get(&self, s: &str) -> Option<&str> {
        let canonical = *self.table.borrow().get_ref(&ByteKey::new(s.as_bytes()))?;
        // SAFETY: canonical UTF-8 copy of `s` in the arena
        Some(unsafe { str::from_utf8_unchecked(slice::from_raw_parts(canonical.as_ptr(), s.len())) })
    }

    #[inline]
    pub fn contains(&self, s: &str) -> bool {
        self.table
            .borrow()
            .contains_key(&ByteKey::new(s.as_bytes()))
    }

    /// Number of distinct strings
    #[inline]
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes acquired by the content arena
    #[inline]
    pub fn arena_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }
}

impl<'a, A: Allocator> fmt::Debug for Interner<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("strings", &self.len())
            .field("arena_bytes", &self.arena_bytes())
            .finish()
    }
}
