//! Scoped ownership of a buffer allocated on the foreign side

use std::fmt;
use std::ptr::NonNull;
use std::slice;

use crate::provider::ConversionProvider;

/// An output buffer allocated by a [`ConversionProvider`]
///
/// Exactly one `ExternalBuffer` exists per foreign allocation. It is neither
/// `Clone` nor `Copy`, and dropping it hands the pointer back to the provider's
/// release routine, so the allocation is freed once on every exit path.
pub struct ExternalBuffer<'p, P: ConversionProvider + ?Sized> {
    ptr: NonNull<u8>,
    provider: &'p P,
}

impl<'p, P: ConversionProvider + ?Sized> ExternalBuffer<'p, P> {
    /// Take ownership of a pointer written by `provider.invoke`
    ///
    /// Returns `None` for NULL, which owns nothing and must not be released.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `provider.invoke`, must not have been released,
    /// and must not be owned by any other `ExternalBuffer`.
    pub unsafe fn adopt(ptr: *mut u8, provider: &'p P) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, provider })
    }

    /// Raw address of the allocation, for logging and comparisons
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Bytes actually backing the allocation, if the provider can tell
    pub fn available(&self) -> Option<usize> {
        // SAFETY: `ptr` is live until drop.
        unsafe { self.provider.allocation_size(self.ptr.as_ptr()) }
    }

    /// Copy the first `len` bytes into caller-owned memory
    ///
    /// # Safety
    ///
    /// The allocation must hold at least `len` readable bytes.
    pub unsafe fn copy_prefix(&self, len: usize) -> Vec<u8> {
        // SAFETY: `ptr` is non-NULL and live; caller guarantees `len` bytes.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), len) }.to_vec()
    }
}

impl<P: ConversionProvider + ?Sized> Drop for ExternalBuffer<'_, P> {
    fn drop(&mut self) {
        log::trace!(
            "releasing {:p} via {} provider",
            self.ptr.as_ptr(),
            self.provider.name()
        );
        // SAFETY: `adopt` made this handle the sole owner of a live pointer
        // from this provider; drop runs once.
        unsafe { self.provider.release(self.ptr.as_ptr()) };
    }
}

impl<P: ConversionProvider + ?Sized> fmt::Debug for ExternalBuffer<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalBuffer")
            .field("ptr", &self.ptr)
            .field("provider", &self.provider.name())
            .finish()
    }
}
