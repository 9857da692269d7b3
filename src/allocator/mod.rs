//! Memory allocators - a statically dispatched capability with two backends
//!
//! Design: Three-layer architecture, mirroring how requests flow:
//! 1. Bump arithmetic (fast path, a mask and a subtract)
//! 2. Arena chunk management (slow path, amortized cost)
//! 3. System memory (rare, bulk acquisition through the backing allocator)
//!
//! Callers pick an implementation at compile time through the `Allocator`
//! trait; there are no vtables anywhere on the allocation path.

mod arena;
mod bump;
mod error;
mod layout;
mod system;


pub use arena::{Arena, CHUNK_ALIGN, DEFAULT_CHUNK_SIZE_WITHOUT_FOOTER, FOOTER_SIZE};
pub use bump::{round_down, round_up};
pub use error::AllocError;
pub use layout::Layout;
pub use system::SystemAlloc;
pub(crate) use system::SYSTEM;

use core::ptr::{self, NonNull};

use crate::fatal;

/// The allocator capability
///
/// Core operations are `allocate`, `allocate_zeroed`, `reallocate` and
/// `release`. The extended operations (`reset`, `set_limit`,
/// `allocated_bytes`) are optional and default to no-ops.
///
/// # Safety
///
/// Implementors must guarantee that a successful `allocate` returns memory
/// valid for `layout.size()` bytes and aligned to `layout.align()`, that it
/// stays valid until released (or until the allocator's own bulk
/// reclamation), and that `reallocate` preserves the first
/// `min(old.size(), new.size())` bytes.
pub unsafe trait Allocator {
    /// Allocate memory for `layout`. Zero-size requests return a non-null,
    /// aligned pointer that must not be dereferenced.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Allocate and zero exactly `layout.size()` bytes
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(layout)?;
        // SAFETY: `allocate` returned a block valid for `layout.size()` bytes
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
        Ok(ptr)
    }

    /// Resize a block, preserving its leading `min(old, new)` bytes. The
    /// block may move.
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `old_layout`
    /// - On success `ptr` must no longer be used
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError>;

    /// Return a block to the allocator
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator with `layout`
    /// - `ptr` must not be used afterwards
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocator-specific bulk reclamation
    fn reset(&mut self) {}

    /// Cap the total bytes the allocator may acquire (`None` = unbounded)
    fn set_limit(&self, _limit: Option<usize>) {}

    /// Bytes currently acquired by the allocator, or 0 if not tracked
    fn allocated_bytes(&self) -> usize {
        0
    }

    /// `allocate`, terminating with a diagnostic on failure
    #[inline]
    #[track_caller]
    fn allocate_or_abort(&self, layout: Layout) -> NonNull<u8> {
        match self.allocate(layout) {
            Ok(ptr) => ptr,
            Err(err) => fatal::alloc_failure("allocate", layout, err),
        }
    }

    /// `allocate_zeroed`, terminating with a diagnostic on failure
    #[inline]
    #[track_caller]
    fn allocate_zeroed_or_abort(&self, layout: Layout) -> NonNull<u8> {
        match self.allocate_zeroed(layout) {
            Ok(ptr) => ptr,
            Err(err) => fatal::alloc_failure("allocate_zeroed", layout, err),
        }
    }

    /// `reallocate`, terminating with a diagnostic on failure
    ///
    /// # Safety
    /// Same requirements as [`Allocator::reallocate`]
    #[inline]
    #[track_caller]
    unsafe fn reallocate_or_abort(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> NonNull<u8> {
        match self.reallocate(ptr, old_layout, new_layout) {
            Ok(ptr) => ptr,
            Err(err) => fatal::alloc_failure("reallocate", new_layout, err),
        }
    }
}

/// Non-null pointer for zero-size requests: the alignment itself, like
/// `NonNull::dangling` but for any power-of-two alignment
#[inline]
pub(crate) fn dangling_for(align: usize) -> NonNull<u8> {
    debug_assert!(align.is_power_of_two());
    // SAFETY: a power of two is never zero
    unsafe { NonNull::new_unchecked(align as *mut u8) }
}
