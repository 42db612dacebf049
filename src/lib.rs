//! mobiconvert gateway - safe access to a native e-book conversion library
//!
//! This library drives an external native routine that converts MOBI/AZW3
//! documents to EPUB. The conversion itself happens entirely inside the
//! native library; this crate owns the boundary: marshalling the input,
//! checking the status, copying the output into Rust memory and releasing
//! the foreign allocation exactly once.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//! - `ffi`: raw C ABI of the native library
//! - `provider`: the injectable conversion capability
//! - `native`: dynamic loading of the real library via libloading
//! - `buffer`: scoped ownership of foreign allocations
//! - `gateway`: the checked conversion call
//! - `metadata`: Palm database header inspection
//! - `validation`: input checks before the call
//! - `fingerprint`: BLAKE3 digests of outputs
//! - `job`: file-to-file conversion
//! - `logging`: stderr logger for binaries
//!
//! # Safety
//!
//! Memory allocated by the native library is only ever released through the
//! provider's matching deallocator, from the `Drop` of an
//! [`buffer::ExternalBuffer`].

pub mod buffer;
pub mod error;
pub mod ffi;
pub mod fingerprint;
pub mod gateway;
pub mod job;
pub mod logging;
pub mod metadata;
pub mod native;
pub mod provider;
pub mod validation;

// Re-export main types for convenience
pub use error::GatewayError;
pub use gateway::{ConversionGateway, ConversionReport, GatewayOptions, NativeOutcome};
pub use native::{Deallocator, LibraryConfig, NativeLibrary};
pub use provider::ConversionProvider;
