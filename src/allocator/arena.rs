//! Arena management - chunked bump allocation over a backing allocator
//!
//! Design: memory comes from a singly linked list of chunks, newest first.
//! Each chunk carries its metadata (the footer) at its top end, and the
//! cursor bumps *down* from the footer toward the chunk start. Chunks grow
//! geometrically, so the slow path runs O(log n) times for n bytes.
//!
//! Individual frees are no-ops; memory comes back in bulk through `reset`
//! (keep the newest chunk, drop the rest) or `destroy`/`Drop` (drop all).

use core::cell::Cell;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};
use core::slice;
use core::str;

use super::bump::{bump_down, round_down, round_up};
use super::system::SYSTEM;
use super::{dangling_for, AllocError, Allocator, Layout, SystemAlloc};
use crate::fatal;
use crate::logging::{log_arena_destroyed, log_arena_reset, log_chunk_acquired, perf};

/// Alignment of every chunk and of the footer placement
pub const CHUNK_ALIGN: usize = 16;

/// Bytes reserved at the top of each chunk for its footer
pub const FOOTER_SIZE: usize = (mem::size_of::<ChunkFooter>() + CHUNK_ALIGN - 1) & !(CHUNK_ALIGN - 1);

/// Usable size of the first chunk, chosen so a default chunk is one page
pub const DEFAULT_CHUNK_SIZE_WITHOUT_FOOTER: usize = 4096 - FOOTER_SIZE;

/// Chunk metadata, stored at `data + usable size`
struct ChunkFooter {
    /// Start of the chunk's block, as returned by the backing allocator
    data: NonNull<u8>,
    /// Layout the block was acquired with (usable size + FOOTER_SIZE)
    layout: Layout,
    /// Next older chunk
    prev: Cell<Option<NonNull<ChunkFooter>>>,
    /// Bump cursor; everything in `[ptr, footer)` is handed out
    ptr: Cell<NonNull<u8>>,
    /// Cumulative usable size of this chunk and all older ones
    allocated_bytes: Cell<usize>,
}

impl ChunkFooter {
    #[inline]
    fn usable_size(&self) -> usize {
        self.layout.size() - FOOTER_SIZE
    }

    #[inline]
    fn start(&self) -> usize {
        self.data.as_ptr() as usize
    }

    #[inline]
    fn cursor(&self) -> usize {
        self.ptr.get().as_ptr() as usize
    }

    /// Pointer `offset` bytes into the chunk, derived from `data`
    ///
    /// # Safety
    /// `offset` must not exceed the usable size
    #[inline]
    unsafe fn at(&self, offset: usize) -> NonNull<u8> {
        NonNull::new_unchecked(self.data.as_ptr().add(offset))
    }
}

/// Bump allocator drawing its chunks from a backing allocator
///
/// Pointers it hands out stay valid until `reset`, `destroy` or drop, all of
/// which need `&mut self`. Values placed with [`Arena::alloc`] are never
/// dropped.
pub struct Arena<'a, A: Allocator = SystemAlloc> {
    current: Cell<Option<NonNull<ChunkFooter>>>,
    allocation_limit: Cell<Option<usize>>,
    min_align: usize,
    backing: &'a A,
}

impl Arena<'static, SystemAlloc> {
    /// Arena over the system allocator with `min_align = 1`
    pub fn new() -> Self {
        Self::with_backing(&SYSTEM)
    }
}

impl Default for Arena<'static, SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A: Allocator> Arena<'a, A> {
    /// Arena over `backing` with `min_align = 1`. No chunk is acquired until
    /// the first allocation.
    pub fn with_backing(backing: &'a A) -> Self {
        Self {
            current: Cell::new(None),
            allocation_limit: Cell::new(None),
            min_align: 1,
            backing,
        }
    }

    /// Arena whose allocations are all aligned to at least `min_align`
    #[track_caller]
    pub fn with_min_align(backing: &'a A, min_align: usize) -> Self {
        match Self::try_with_min_align(backing, min_align) {
            Ok(arena) => arena,
            Err(err) => fatal!("arena min_align {}: {}", min_align, err),
        }
    }

    /// `min_align` must be a power of two no larger than [`CHUNK_ALIGN`]
    pub fn try_with_min_align(backing: &'a A, min_align: usize) -> Result<Self, AllocError> {
        if !min_align.is_power_of_two() || min_align > CHUNK_ALIGN {
            return Err(AllocError::InvalidAlignment { align: min_align });
        }
        Ok(Self {
            current: Cell::new(None),
            allocation_limit: Cell::new(None),
            min_align,
            backing,
        })
    }

    #[inline]
    pub fn min_align(&self) -> usize {
        self.min_align
    }

    #[inline]
    pub fn allocation_limit(&self) -> Option<usize> {
        self.allocation_limit.get()
    }

    /// Cap the cumulative usable size of all chunks. Takes effect on the
    /// next chunk acquisition; existing chunks are kept.
    ///
    /// A request that fits the remaining budget always succeeds. Its chunk
    /// is padded to the chunk alignment, so `allocated_bytes` may end up
    /// to `CHUNK_ALIGN - 1` bytes past the limit.
    #[inline]
    pub fn set_allocation_limit(&self, limit: Option<usize>) {
        self.allocation_limit.set(limit);
    }

    /// Cumulative usable size of the chunk chain (0 when empty)
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.head().map_or(0, |footer| footer.allocated_bytes.get())
    }

    /// Number of chunks currently owned
    pub fn chunk_count(&self) -> usize {
        let mut count = 0;
        let mut link = self.current.get();
        while let Some(footer) = link {
            count += 1;
            // SAFETY: every linked footer belongs to a live chunk
            link = unsafe { footer.as_ref() }.prev.get();
        }
        count
    }

    /// Bytes still available in the newest chunk
    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.head()
            .map_or(0, |footer| footer.cursor() - footer.start())
    }

    #[inline]
    fn head(&self) -> Option<&ChunkFooter> {
        // SAFETY: the head footer lives as long as its chunk, which outlives
        // any shared borrow of the arena
        self.current.get().map(|footer| unsafe { &*footer.as_ptr() })
    }

    /// Allocate `layout`, terminating on failure
    #[inline]
    #[track_caller]
    pub fn alloc_layout(&self, layout: Layout) -> NonNull<u8> {
        match self.try_alloc_layout(layout) {
            Ok(ptr) => ptr,
            Err(err) => fatal::alloc_failure("arena allocate", layout, err),
        }
    }

    /// Allocate `layout`: bump within the newest chunk, or acquire a new one
    #[inline]
    pub fn try_alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(self.zero_size_ptr(layout.align()));
        }
        match self.try_alloc_fast(layout)? {
            Some(ptr) => Ok(ptr),
            None => self.alloc_slow(layout),
        }
    }

    /// Move `value` into the arena
    #[inline]
    #[track_caller]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        match self.try_alloc(value) {
            Ok(slot) => slot,
            Err(err) => fatal::alloc_failure("arena alloc", Layout::new::<T>(), err),
        }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn try_alloc<T>(&self, value: T) -> Result<&mut T, AllocError> {
        let ptr = self.try_alloc_layout(Layout::new::<T>())?.cast::<T>();
        // SAFETY: fresh, aligned, exclusively owned until reset
        unsafe {
            ptr.as_ptr().write(value);
            Ok(&mut *ptr.as_ptr())
        }
    }

    /// Copy a slice into the arena
    #[track_caller]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        let layout = match Layout::array::<T>(src.len()) {
            Ok(layout) => layout,
            Err(err) => fatal!("slice of {} elements: {}", src.len(), err),
        };
        let dst = self.alloc_layout(layout).cast::<T>();
        // SAFETY: `dst` holds `src.len()` elements and cannot overlap `src`
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());
            slice::from_raw_parts_mut(dst.as_ptr(), src.len())
        }
    }

    /// Copy a string into the arena
    #[track_caller]
    pub fn alloc_str(&self, src: &str) -> &str {
        let bytes = self.alloc_slice_copy(src.as_bytes());
        // SAFETY: copied verbatim from a `str`
        unsafe { str::from_utf8_unchecked(bytes) }
    }

    /// Release every chunk except the newest and rewind it. Subsequent
    /// allocations that fit the retained chunk acquire nothing.
    pub fn reset(&mut self) {
        let Some(head) = self.head() else {
            return;
        };
        let _perf = perf::track("arena_reset");

        // SAFETY: `&mut self` guarantees no outstanding arena borrows
        let released = unsafe { self.release_chain(head.prev.replace(None)) };
        let usable = head.usable_size();
        // SAFETY: the usable size is the footer offset
        head.ptr.set(unsafe { head.at(usable) });
        head.allocated_bytes.set(usable);

        log_arena_reset(released, usable);
    }

    /// Release every chunk and return to the empty state
    pub fn destroy(&mut self) {
        // SAFETY: `&mut self` guarantees no outstanding arena borrows
        let released = unsafe { self.release_chain(self.current.take()) };
        if released > 0 {
            log_arena_destroyed(released);
        }
    }

    /// Hand every chunk from `link` downward back to the backing allocator
    unsafe fn release_chain(&self, mut link: Option<NonNull<ChunkFooter>>) -> usize {
        let mut released = 0;
        while let Some(footer) = link {
            let (data, layout, prev) = {
                let footer = footer.as_ref();
                (footer.data, footer.layout, footer.prev.get())
            };
            self.backing.release(data, layout);
            link = prev;
            released += 1;
        }
        released
    }

    /// Pointer for a zero-size request: the cursor aligned down, never
    /// consuming capacity
    fn zero_size_ptr(&self, align: usize) -> NonNull<u8> {
        match self.head() {
            Some(footer) => {
                let aligned = round_down(footer.cursor(), align);
                if aligned >= footer.start() {
                    // SAFETY: `aligned` lies inside the chunk
                    unsafe { footer.at(aligned - footer.start()) }
                } else {
                    dangling_for(align)
                }
            }
            None => dangling_for(align),
        }
    }

    #[inline(always)]
    fn try_alloc_fast(&self, layout: Layout) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(footer) = self.head() else {
            return Ok(None);
        };

        let start = footer.start();
        let bumped = bump_down(
            start,
            footer.cursor(),
            layout.size(),
            layout.align(),
            self.min_align,
        )?;

        Ok(bumped.map(|addr| {
            // SAFETY: `bump_down` keeps `addr` within `[start, cursor]`
            let ptr = unsafe { footer.at(addr - start) };
            footer.ptr.set(ptr);
            ptr
        }))
    }

    #[cold]
    #[inline(never)]
    fn alloc_slow(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let chunk_align = layout.align().max(CHUNK_ALIGN).max(self.min_align);

        let (prev_usable, prev_allocated) = self
            .head()
            .map_or((0, 0), |footer| (footer.usable_size(), footer.allocated_bytes.get()));

        // The budget is checked against the aligned request; the chunk
        // itself is padded to `chunk_align` so its footer stays aligned
        let requested = round_up(layout.size(), layout.align().max(self.min_align))?;
        let padded = round_up(requested, chunk_align)?;
        let grown = prev_usable
            .saturating_mul(2)
            .max(DEFAULT_CHUNK_SIZE_WITHOUT_FOOTER);
        let mut new_size = round_up(grown, chunk_align)?.max(padded);

        if let Some(limit) = self.allocation_limit.get() {
            let remaining = limit.saturating_sub(prev_allocated);
            if new_size > remaining {
                if requested > remaining {
                    return Err(AllocError::LimitExceeded {
                        requested: layout.size(),
                        remaining,
                    });
                }
                new_size = padded;
            }
        }

        let footer = self.new_chunk(new_size, chunk_align, prev_allocated)?;
        self.current.set(Some(footer));

        match self.try_alloc_fast(layout)? {
            Some(ptr) => Ok(ptr),
            None => fatal!("fresh {}-byte chunk cannot hold {}", new_size, layout),
        }
    }

    /// Acquire a chunk with `size` usable bytes (a multiple of `align`) and
    /// write its footer, linked to the current head
    fn new_chunk(
        &self,
        size: usize,
        align: usize,
        prev_allocated: usize,
    ) -> Result<NonNull<ChunkFooter>, AllocError> {
        debug_assert!(size % align == 0, "chunk size breaks chunk alignment");

        let alloc_size = size
            .checked_add(FOOTER_SIZE)
            .ok_or(AllocError::ArithmeticOverflow)?;
        let allocated_bytes = prev_allocated
            .checked_add(size)
            .ok_or(AllocError::ArithmeticOverflow)?;
        let layout = Layout::from_size_align(alloc_size, align)?;

        let data = self.backing.allocate(layout)?;

        // SAFETY: the block spans `size + FOOTER_SIZE` bytes aligned to
        // `align >= CHUNK_ALIGN`, so `data + size` is a suitably aligned
        // footer slot
        let footer = unsafe {
            let top = data.as_ptr().add(size);
            let footer = top as *mut ChunkFooter;
            footer.write(ChunkFooter {
                data,
                layout,
                prev: Cell::new(self.current.get()),
                ptr: Cell::new(NonNull::new_unchecked(top)),
                allocated_bytes: Cell::new(allocated_bytes),
            });
            NonNull::new_unchecked(footer)
        };

        log_chunk_acquired(size, align, allocated_bytes);
        Ok(footer)
    }
}

unsafe impl<'a, A: Allocator> Allocator for Arena<'a, A> {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.try_alloc_layout(layout)
    }

    /// Never in place: the new block is fresh and the old one stays consumed
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if new_layout.size() == 0 {
            return Ok(self.zero_size_ptr(new_layout.align()));
        }
        let fresh = self.try_alloc_layout(new_layout)?;
        ptr::copy_nonoverlapping(
            ptr.as_ptr(),
            fresh.as_ptr(),
            old_layout.size().min(new_layout.size()),
        );
        Ok(fresh)
    }

    #[inline]
    unsafe fn release(&self, _ptr: NonNull<u8>, _layout: Layout) {}

    fn reset(&mut self) {
        Arena::reset(self)
    }

    fn set_limit(&self, limit: Option<usize>) {
        self.set_allocation_limit(limit)
    }

    fn allocated_bytes(&self) -> usize {
        Arena::allocated_bytes(self)
    }
}

impl<'a, A: Allocator> Drop for Arena<'a, A> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<'a, A: Allocator> fmt::Debug for Arena<'a, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("chunks", &self.chunk_count())
            .field("allocated_bytes", &self.allocated_bytes())
            .field("chunk_capacity", &self.chunk_capacity())
            .field("min_align", &self.min_align)
            .field("allocation_limit", &self.allocation_limit.get())
            .finish()
    }
}
