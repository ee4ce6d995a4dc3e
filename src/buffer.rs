//! An owned, address aligned byte buffer suitable for direct IO.

use std::alloc::{self, Layout};
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
/// The buffer could not be allocated.
pub enum AllocError {
    #[error("invalid alignment {align} for buffer of {size} bytes")]
    /// The alignment is not a power of two or the size overflows once aligned.
    InvalidLayout { align: usize, size: usize },
    #[error("out of memory allocating {size} bytes")]
    /// The allocator returned no memory.
    OutOfMemory { size: usize },
}

/// A guard value kept alive for as long as the buffer is.
pub type DynamicGuard = Box<dyn Any + Send + Sync>;

/// A heap buffer whose start address is a multiple of the requested alignment.
///
/// The memory is zeroed on allocation and released exactly once on drop.
/// The type is intentionally not `Clone`.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
    guard: Option<DynamicGuard>,
}

// SAFETY: The buffer uniquely owns its allocation, there is no interior
//         mutability and shared access only hands out `&[u8]`.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes aligned to `align`.
    ///
    /// A zero sized request does not touch the allocator.
    pub fn zeroed(align: usize, size: usize) -> Result<Self, AllocError> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| AllocError::InvalidLayout { align, size })?;

        if size == 0 {
            return Ok(Self::empty(layout));
        }

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size })?;

        Ok(Self {
            ptr,
            len: size,
            layout,
            guard: None,
        })
    }

    /// Attach a `guard` which is dropped together with the buffer memory.
    pub fn with_guard(mut self, guard: DynamicGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    fn empty(layout: Layout) -> Self {
        // A dangling pointer with the right alignment, never dereferenced
        // for more than zero bytes and never passed to `dealloc`.
        let ptr = NonNull::new(std::ptr::without_provenance_mut(layout.align()))
            .unwrap_or(NonNull::dangling());
        Self {
            ptr,
            len: 0,
            layout,
            guard: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // SAFETY: `ptr` is valid for `len` initialized (zeroed) bytes for as long
        //         as `self` is alive.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: As above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Debug for AlignedBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AlignedBuffer(len={}, align={})",
            self.len,
            self.layout.align()
        )
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }

        // SAFETY: The pointer was returned by `alloc_zeroed` with this exact layout
        //         and ownership guarantees this is the only release.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
