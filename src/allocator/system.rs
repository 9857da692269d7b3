//! System allocator - the platform's aligned allocation family
//!
//! Design: zero-sized and stateless. Every other structure in the crate
//! ultimately gets its memory from here. On unix it calls `posix_memalign`,
//! `realloc` and `free` directly; other targets go through `std::alloc`.
//!
//! Reallocation always honours the new alignment: the platform `realloc` is
//! only used when its own guarantee already covers the request, otherwise
//! the block moves to a fresh aligned allocation.

use core::ptr::{self, NonNull};

use super::{dangling_for, AllocError, Allocator, Layout};
use crate::logging::{log_allocation, log_deallocation};

/// Allocator backed directly by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAlloc;

/// Shared instance for structures that default to system backing
pub(crate) static SYSTEM: SystemAlloc = SystemAlloc;

#[cfg(unix)]
mod platform {
    use core::mem;
    use core::ptr;

    use super::{AllocError, Layout};

    /// Alignment every `malloc`/`realloc` result is guaranteed to have
    const MALLOC_ALIGN: usize = 2 * mem::size_of::<usize>();

    pub unsafe fn alloc(layout: Layout) -> Result<*mut u8, AllocError> {
        // posix_memalign wants a multiple of the pointer size
        let align = layout.align().max(mem::size_of::<*mut libc::c_void>());
        let mut out: *mut libc::c_void = ptr::null_mut();
        if libc::posix_memalign(&mut out, align, layout.size()) != 0 {
            return Ok(ptr::null_mut());
        }
        Ok(out as *mut u8)
    }

    pub fn realloc_keeps_alignment(_old: Layout, new: Layout) -> bool {
        new.align() <= MALLOC_ALIGN
    }

    pub unsafe fn realloc(ptr: *mut u8, _old: Layout, new: Layout) -> Result<*mut u8, AllocError> {
        Ok(libc::realloc(ptr as *mut libc::c_void, new.size()) as *mut u8)
    }

    pub unsafe fn free(ptr: *mut u8, _layout: Layout) {
        libc::free(ptr as *mut libc::c_void)
    }
}

#[cfg(not(unix))]
mod platform {
    use super::{AllocError, Layout};

    pub unsafe fn alloc(layout: Layout) -> Result<*mut u8, AllocError> {
        Ok(std::alloc::alloc(layout.to_std()?))
    }

    pub fn realloc_keeps_alignment(old: Layout, new: Layout) -> bool {
        old.align() == new.align()
    }

    pub unsafe fn realloc(ptr: *mut u8, old: Layout, new: Layout) -> Result<*mut u8, AllocError> {
        // validates the new size against the std layout rules
        new.to_std()?;
        Ok(std::alloc::realloc(ptr, old.to_std()?, new.size()))
    }

    pub unsafe fn free(ptr: *mut u8, layout: Layout) {
        if let Ok(layout) = layout.to_std() {
            std::alloc::dealloc(ptr, layout)
        }
    }
}

fn out_of_memory(layout: Layout) -> AllocError {
    AllocError::OutOfMemory {
        size: layout.size(),
        align: layout.align(),
    }
}

unsafe impl Allocator for SystemAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling_for(layout.align()));
        }

        // SAFETY: size is non-zero and the alignment is a power of two
        let raw = unsafe { platform::alloc(layout)? };
        let ptr = NonNull::new(raw).ok_or_else(|| out_of_memory(layout))?;

        log_allocation(layout.size(), ptr.as_ptr());
        Ok(ptr)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        // Zero-size blocks were never handed to the platform
        if old_layout.size() == 0 {
            return self.allocate(new_layout);
        }
        if new_layout.size() == 0 {
            self.release(ptr, old_layout);
            return Ok(dangling_for(new_layout.align()));
        }

        if platform::realloc_keeps_alignment(old_layout, new_layout) {
            let raw = platform::realloc(ptr.as_ptr(), old_layout, new_layout)?;
            return NonNull::new(raw).ok_or_else(|| out_of_memory(new_layout));
        }

        // Stricter alignment than realloc guarantees: move the block
        let fresh = self.allocate(new_layout)?;
        ptr::copy_nonoverlapping(
            ptr.as_ptr(),
            fresh.as_ptr(),
            old_layout.size().min(new_layout.size()),
        );
        self.release(ptr, old_layout);
        Ok(fresh)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        log_deallocation(ptr.as_ptr());
        platform::free(ptr.as_ptr(), layout);
    }
}
