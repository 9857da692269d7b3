//! Vector - growable array over the allocator capability
//!
//! Design: contiguous storage with geometric growth (factor of 2)
//! - First growth reserves 8 elements
//! - Storage comes only from `allocate`/`reallocate`/`release`
//! - Zero-sized elements never touch the allocator

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

use crate::allocator::{AllocError, Allocator, Layout, SystemAlloc, SYSTEM};

/// Capacity of the first allocation
const MIN_CAPACITY: usize = 8;

/// Growable array whose storage lives in an `Allocator`
pub struct Vector<'a, T, A: Allocator = SystemAlloc> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    backing: &'a A,
    _marker: PhantomData<T>,
}

impl<T> Vector<'static, T, SystemAlloc> {
    pub fn new() -> Self {
        Self::new_in(&SYSTEM)
    }
}

impl<T> Default for Vector<'static, T, SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, A: Allocator> Vector<'a, T, A> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Empty vector; nothing is allocated until the first push
    pub fn new_in(backing: &'a A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            backing,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Make room for `additional` more elements, terminating on failure
    #[track_caller]
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            fatal!("vector reserve of {} failed: {}", additional, err);
        }
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::ArithmeticOverflow)?;
        if required <= self.cap {
            return Ok(());
        }

        let doubled = if self.cap == 0 {
            MIN_CAPACITY
        } else {
            self.cap.saturating_mul(2)
        };
        self.grow_to(doubled.max(required))
    }

    /// Append, terminating on allocation failure
    #[track_caller]
    pub fn push(&mut self, value: T) {
        if let Err(err) = self.try_push(value) {
            fatal!("vector push failed at capacity {}: {}", self.cap, err);
        }
    }

    pub fn try_push(&mut self, value: T) -> Result<(), AllocError> {
        if self.len == self.cap {
            self.try_reserve(1)?;
        }
        // SAFETY: `len < cap` after reserving
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Append a copy of every element of `src`, terminating on failure
    #[track_caller]
    pub fn extend_from_slice(&mut self, src: &[T])
    where
        T: Copy,
    {
        if let Err(err) = self.try_extend_from_slice(src) {
            fatal!("vector extend by {} failed: {}", src.len(), err);
        }
    }

    pub fn try_extend_from_slice(&mut self, src: &[T]) -> Result<(), AllocError>
    where
        T: Copy,
    {
        self.try_reserve(src.len())?;
        // SAFETY: room for `src.len()` more elements was just reserved, and
        // `src` cannot alias the uninitialised tail
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(self.len), src.len());
        }
        self.len += src.len();
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the element at `len` was initialised and is now logically
        // removed
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Drop every element; capacity is kept
    pub fn clear(&mut self) {
        let elements: *mut [T] = self.as_mut_slice();
        // Zero the length first so a panicking destructor leaks instead of
        // double-dropping
        self.len = 0;
        // SAFETY: the elements were initialised and are no longer reachable
        unsafe { ptr::drop_in_place(elements) };
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[0, len)` is initialised; `ptr` is aligned and non-null
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, with exclusive access
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn grow_to(&mut self, new_cap: usize) -> Result<(), AllocError> {
        debug_assert!(!Self::IS_ZST, "zero-sized elements never need storage");

        let new_layout = Layout::array::<T>(new_cap)?;
        let ptr = if self.cap == 0 {
            self.backing.allocate(new_layout)?
        } else {
            let old_layout = Layout::array::<T>(self.cap)?;
            // SAFETY: `ptr` was allocated by `backing` with `old_layout`
            unsafe {
                self.backing
                    .reallocate(self.ptr.cast(), old_layout, new_layout)?
            }
        };

        self.ptr = ptr.cast();
        self.cap = new_cap;
        Ok(())
    }
}

impl<'a, T, A: Allocator> Drop for Vector<'a, T, A> {
    fn drop(&mut self) {
        self.clear();
        if Self::IS_ZST || self.cap == 0 {
            return;
        }
        if let Ok(layout) = Layout::array::<T>(self.cap) {
            // SAFETY: allocated by `backing` with this layout
            unsafe { self.backing.release(self.ptr.cast(), layout) };
        }
    }
}

impl<'a, T, A: Allocator> Deref for Vector<'a, T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T, A: Allocator> DerefMut for Vector<'a, T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T: fmt::Debug, A: Allocator> fmt::Debug for Vector<'a, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Arena;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn push_pop_order() {
        let mut v = Vector::new();
        for i in 0..5 {
            v.push(i);
        }
        assert_eq!(v.as_slice(), &[0, 1, 2, 3, 4]);
        assert_eq!(v.pop(), Some(4));
        assert_eq!(v.pop(), Some(3));
        assert_eq!(v.len(), 3);
        assert_eq!(v.get(2), Some(&2));
        assert_eq!(v.get(3), None);
    }

    #[test]
    fn growth_sequence() {
        let mut v: Vector<u32> = Vector::new();
        assert_eq!(v.capacity(), 0);

        v.push(1);
        assert_eq!(v.capacity(), 8);

        for i in 0..8 {
            v.push(i);
        }
        assert_eq!(v.capacity(), 16);
    }

    #[test]
    fn reserve_jumps_to_required_size() {
        let mut v: Vector<u8> = Vector::new();
        v.reserve(100);
        assert_eq!(v.capacity(), 100);
        v.reserve(10);
        assert_eq!(v.capacity(), 100);
    }

    #[test]
    fn contents_survive_reallocation() {
        let mut v = Vector::new();
        for i in 0..1000u64 {
            v.push(i * 3);
        }
        assert!(v.iter().enumerate().all(|(i, &x)| x == i as u64 * 3));
    }

    #[test]
    fn zero_sized_elements_never_allocate() {
        let mut v: Vector<()> = Vector::new();
        for _ in 0..10_000 {
            v.push(());
        }
        assert_eq!(v.len(), 10_000);
        assert_eq!(v.capacity(), usize::MAX);
        assert_eq!(v.pop(), Some(()));
    }

    #[test]
    fn reserve_overflow_is_reported() {
        let mut v: Vector<u64> = Vector::new();
        v.push(1);
        assert_eq!(v.try_reserve(usize::MAX), Err(AllocError::ArithmeticOverflow));
        assert_eq!(
            v.try_reserve(usize::MAX / 4),
            Err(AllocError::ArithmeticOverflow)
        );
    }

    #[test]
    fn extend_copies_in_order() {
        let mut v = Vector::new();
        v.push(1u8);
        v.extend_from_slice(&[2, 3, 4]);
        v.extend_from_slice(&[]);
        assert_eq!(v.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(v.capacity(), 8);

        v.extend_from_slice(&[9; 20]);
        assert_eq!(v.len(), 24);
        assert_eq!(v.capacity(), 24);
    }

    #[test]
    fn vector_in_arena() {
        let arena = Arena::new();
        let mut v = Vector::new_in(&arena);
        for word in ["alpha", "beta", "gamma"] {
            v.push(word);
        }
        v.sort_unstable();
        assert_eq!(&*v, &["alpha", "beta", "gamma"]);
        assert_eq!(format!("{:?}", v), r#"["alpha", "beta", "gamma"]"#);
    }

    #[test]
    fn clear_and_drop_run_destructors() {
        let drops = Rc::new(Cell::new(0));
        struct Tracked(Rc<Cell<usize>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut v = Vector::new();
        for _ in 0..4 {
            v.push(Tracked(drops.clone()));
        }
        v.clear();
        assert_eq!(drops.get(), 4);
        assert!(v.capacity() >= 4);

        v.push(Tracked(drops.clone()));
        drop(v.pop());
        assert_eq!(drops.get(), 5);

        v.push(Tracked(drops.clone()));
        drop(v);
        assert_eq!(drops.get(), 6);
    }
}
