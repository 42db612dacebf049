//! Raw ABI of the native conversion library
//!
//! This module describes the C-compatible surface exported by the native
//! conversion library and the allocator routines used to release its output.
//! Nothing here is safe to call directly; [`crate::gateway`] wraps it.
//!
//! # FFI Boundary Contract
//!
//! ```c
//! int ConvertMobiToEpub(const unsigned char *buffer, int64_t buffer_len,
//!                       unsigned char **out_buffer, int64_t *out_buffer_len);
//! ```
//!
//! ## Input
//!
//! - `buffer` points to `buffer_len` readable bytes owned by the caller
//! - The callee must not retain or modify `buffer` after returning
//! - `buffer_len` may be 0
//!
//! ## Output
//!
//! - The return value is a status code, `STATUS_SUCCESS` (0) on success
//! - On success `*out_buffer` points to memory allocated by the library and
//!   `*out_buffer_len` holds the number of valid bytes in it
//! - On failure the output fields carry no meaning and must not be read
//!
//! ## Memory Management
//!
//! **Ownership Model:**
//! - The library allocates the output buffer
//! - Ownership passes to the caller when the call returns
//! - The caller must release it exactly once with the deallocator matching
//!   the library's allocator (`LocalFree` for the Windows build)
//! - A generic `free()` is NOT guaranteed to match
//!
//! The caller initialises `*out_buffer` to NULL and `*out_buffer_len` to 0
//! before the call so that a routine returning without writing them is
//! detected instead of reading stack garbage.

use std::ffi::c_void;

// ============================================================================
// Status Constants
// ============================================================================

/// Success - the output buffer and length are valid
pub const STATUS_SUCCESS: i32 = 0;

/// Generic failure status returned by the reference library
pub const STATUS_ERROR: i32 = 1;

// ============================================================================
// Symbol Names
// ============================================================================

/// Exported name of the conversion routine in the reference library
pub const DEFAULT_CONVERT_SYMBOL: &str = "ConvertMobiToEpub";

/// Windows heap release routine paired with `LocalAlloc`
pub const LOCAL_FREE_SYMBOL: &str = "LocalFree";

/// Windows heap size query paired with `LocalAlloc`
pub const LOCAL_SIZE_SYMBOL: &str = "LocalSize";

/// Platform file name of the native library
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAME: &str = "mobiconvert.dll";

/// Platform file name of the native library
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAME: &str = "libmobiconvert.dylib";

/// Platform file name of the native library
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_LIBRARY_NAME: &str = "libmobiconvert.so";

// ============================================================================
// Function Pointer Types
// ============================================================================

/// Conversion routine: `(buffer, buffer_len, &out_buffer, &out_buffer_len) -> status`
pub type ConvertFn = unsafe extern "C" fn(
    buffer: *const u8,
    buffer_len: i64,
    out_buffer: *mut *mut u8,
    out_buffer_len: *mut i64,
) -> i32;

/// Release routine for library-allocated memory (C `free` shape)
pub type ReleaseFn = unsafe extern "C" fn(ptr: *mut c_void);

/// Allocation size query (`malloc_usable_size` shape)
pub type SizeFn = unsafe extern "C" fn(ptr: *const c_void) -> usize;

/// `HLOCAL LocalFree(HLOCAL hMem)`; returns NULL on success
#[cfg(target_os = "windows")]
pub type LocalFreeFn = unsafe extern "system" fn(mem: *mut c_void) -> *mut c_void;

/// `SIZE_T LocalSize(HLOCAL hMem)`; returns 0 on failure
#[cfg(target_os = "windows")]
pub type LocalSizeFn = unsafe extern "system" fn(mem: *mut c_void) -> usize;
