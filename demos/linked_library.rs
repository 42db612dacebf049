//! Convert through a C-ABI routine linked into this binary
//!
//! Run with `cargo run --example linked_library`. The routine below mimics
//! the shape of `ConvertMobiToEpub`: it allocates its output with `malloc`
//! and expects the caller to release it with `free`.

use std::ffi::c_void;
use std::ptr;

use log::LevelFilter;
use mobiconvert_gateway::ffi::{STATUS_ERROR, STATUS_SUCCESS};
use mobiconvert_gateway::metadata::PALMDB_HEADER_LEN;
use mobiconvert_gateway::ffi::SizeFn;
use mobiconvert_gateway::{ConversionGateway, GatewayOptions, NativeLibrary, logging};

unsafe extern "C" fn uppercase(
    buffer: *const u8,
    buffer_len: i64,
    out_buffer: *mut *mut u8,
    out_buffer_len: *mut i64,
) -> i32 {
    let Ok(len) = usize::try_from(buffer_len) else {
        return STATUS_ERROR;
    };
    unsafe {
        let out = libc::malloc(len.max(1)) as *mut u8;
        if out.is_null() {
            return STATUS_ERROR;
        }
        ptr::copy_nonoverlapping(buffer, out, len);
        for i in 0..len {
            *out.add(i) = (*out.add(i)).to_ascii_uppercase();
        }
        *out_buffer = out;
        *out_buffer_len = buffer_len;
    }
    STATUS_SUCCESS
}

unsafe extern "C" fn release(ptr: *mut c_void) {
    unsafe { libc::free(ptr) };
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn usable_size() -> Option<SizeFn> {
    unsafe extern "C" fn size(ptr: *const c_void) -> usize {
        unsafe { libc::malloc_usable_size(ptr.cast_mut()) }
    }
    Some(size)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn usable_size() -> Option<SizeFn> {
    None
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(LevelFilter::Info)?;

    let library = unsafe { NativeLibrary::from_fns("uppercase", uppercase, release, usable_size()) };
    // Without a size query the reported length has to be taken on trust.
    let options = GatewayOptions {
        trust_unverified_len: usable_size().is_none(),
        ..GatewayOptions::default()
    };
    let gateway = ConversionGateway::with_options(library, options);

    let mut book = vec![0u8; PALMDB_HEADER_LEN];
    book[..9].copy_from_slice(b"demo_book");
    book[60..64].copy_from_slice(b"BOOK");
    book[64..68].copy_from_slice(b"MOBI");
    book.extend_from_slice(b"call me ishmael.");

    let report = gateway.convert_with_report(&book)?;
    if let Some(header) = &report.header {
        println!("Input:  {}", header);
    }
    println!(
        "Output: {} bytes, blake3 {}",
        report.output.len(),
        report.fingerprint.short()
    );
    println!(
        "Tail:   {}",
        String::from_utf8_lossy(&report.output[PALMDB_HEADER_LEN..])
    );
    Ok(())
}
