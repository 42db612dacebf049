//! The native conversion capability injected into the gateway
//!
//! [`ConversionProvider`] is the seam between the gateway and whatever
//! actually performs the conversion: a dynamically loaded library
//! ([`crate::native::NativeLibrary`]) in production, or a fake that tracks
//! allocations in tests.

use std::sync::Arc;

/// A routine that converts a byte buffer and hands back a foreign allocation
///
/// Implementors own two halves of one contract: `invoke` may allocate an
/// output buffer, and `release` must be the deallocator matching that
/// allocation.
///
/// # Safety
///
/// The methods are `unsafe` because they operate on raw pointers supplied by
/// the gateway or produced by the foreign side. The gateway guarantees:
///
/// - `input` points to `input_len` readable bytes for the whole call
/// - `output` and `output_len` point to writable locations, pre-set to
///   NULL and 0
/// - `release` is called at most once per pointer returned through `output`,
///   and never with NULL
pub trait ConversionProvider {
    /// Perform the raw conversion call and return its status code
    ///
    /// # Safety
    ///
    /// See the trait-level contract.
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32;

    /// Release a buffer previously written through `output` by `invoke`
    ///
    /// # Safety
    ///
    /// `buffer` must be a non-NULL pointer returned by `invoke` that has not
    /// been released yet.
    unsafe fn release(&self, buffer: *mut u8);

    /// Number of bytes actually backing `buffer`, when the allocator can tell
    ///
    /// # Safety
    ///
    /// `buffer` must be a live, non-NULL pointer returned by `invoke`.
    unsafe fn allocation_size(&self, _buffer: *const u8) -> Option<usize> {
        None
    }

    /// Name used in log messages
    fn name(&self) -> &str {
        "native"
    }
}

impl<P: ConversionProvider + ?Sized> ConversionProvider for &P {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        // SAFETY: forwarded unchanged; caller upholds the trait contract.
        unsafe { (**self).invoke(input, input_len, output, output_len) }
    }

    unsafe fn release(&self, buffer: *mut u8) {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).release(buffer) }
    }

    unsafe fn allocation_size(&self, buffer: *const u8) -> Option<usize> {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).allocation_size(buffer) }
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<P: ConversionProvider + ?Sized> ConversionProvider for Box<P> {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        // SAFETY: forwarded unchanged; caller upholds the trait contract.
        unsafe { (**self).invoke(input, input_len, output, output_len) }
    }

    unsafe fn release(&self, buffer: *mut u8) {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).release(buffer) }
    }

    unsafe fn allocation_size(&self, buffer: *const u8) -> Option<usize> {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).allocation_size(buffer) }
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<P: ConversionProvider + ?Sized> ConversionProvider for Arc<P> {
    unsafe fn invoke(
        &self,
        input: *const u8,
        input_len: i64,
        output: *mut *mut u8,
        output_len: *mut i64,
    ) -> i32 {
        // SAFETY: forwarded unchanged; caller upholds the trait contract.
        unsafe { (**self).invoke(input, input_len, output, output_len) }
    }

    unsafe fn release(&self, buffer: *mut u8) {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).release(buffer) }
    }

    unsafe fn allocation_size(&self, buffer: *const u8) -> Option<usize> {
        // SAFETY: forwarded unchanged.
        unsafe { (**self).allocation_size(buffer) }
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
