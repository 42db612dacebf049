//! The conversion gateway
//!
//! [`ConversionGateway`] owns the one cross-boundary call of this crate:
//!
//! 1. Validate the input and derive its length from the slice
//! 2. Pre-set the output pointer to NULL and the output length to 0
//! 3. Invoke the provider (panics from Rust providers are caught)
//! 4. Wrap any returned pointer in an [`ExternalBuffer`] immediately
//! 5. Match on the status: only a success outcome exposes its buffer
//! 6. Validate the reported length, copy, and let the handle release the
//!    foreign allocation
//!
//! Because the buffer handle is created before anything is inspected, every
//! exit path (failure status, bad length, panic) releases a non-NULL
//! allocation exactly once, and a NULL pointer is never released.
//!
//! # Example
//!
//! ```rust,no_run
//! use mobiconvert_gateway::gateway::ConversionGateway;
//! use mobiconvert_gateway::native::{LibraryConfig, NativeLibrary};
//!
//! let library = NativeLibrary::open(&LibraryConfig::default())?;
//! let gateway = ConversionGateway::new(library);
//! let epub = gateway.convert(&std::fs::read("test.azw3").unwrap())?;
//! # Ok::<(), mobiconvert_gateway::GatewayError>(())
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::buffer::ExternalBuffer;
use crate::error::GatewayError;
use crate::ffi::STATUS_SUCCESS;
use crate::fingerprint::Fingerprint;
use crate::metadata::PalmDbHeader;
use crate::provider::ConversionProvider;
use crate::validation::InputValidator;

/// Default upper bound for a plausible output length (1 GiB)
pub const DEFAULT_MAX_OUTPUT_LEN: usize = 1024 * 1024 * 1024;

/// Gateway behaviour settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Reported output lengths above this are treated as invalid responses
    pub max_output_len: usize,
    /// Checks applied to inputs before the native call
    pub validator: InputValidator,
    /// Copy non-empty outputs even when the provider cannot report the
    /// allocation size. Off by default: such outputs are rejected, because
    /// an over-reported length would read past the allocation.
    pub trust_unverified_len: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
            validator: InputValidator::new(),
            trust_unverified_len: false,
        }
    }
}

/// Result of one raw native call
///
/// The output buffer of a successful call is only reachable by matching on
/// [`NativeOutcome::Success`]. Any buffer held here is released when the
/// outcome is dropped.
pub enum NativeOutcome<'p, P: ConversionProvider + ?Sized> {
    /// Status was `STATUS_SUCCESS`
    Success {
        /// Output allocation, `None` if the callee left the pointer NULL
        buffer: Option<ExternalBuffer<'p, P>>,
        /// Output length as reported by the callee
        reported_len: i64,
    },
    /// Status was anything else
    Failure {
        /// Status code returned by the callee
        status: i32,
        /// Allocation the callee wrote despite failing, released unread
        buffer: Option<ExternalBuffer<'p, P>>,
    },
}

impl<P: ConversionProvider + ?Sized> NativeOutcome<'_, P> {
    /// Copy a successful outcome into caller-owned memory
    ///
    /// The foreign allocation is released before this returns, whatever the
    /// result.
    ///
    /// # Errors
    ///
    /// - `ConversionFailed` for a failure status (nothing is copied)
    /// - `InvalidExternalResponse` for a NULL pointer, a negative length, a
    ///   length above `max_output_len`, a length larger than the allocation
    ///   the provider reports, or a non-zero length the provider cannot
    ///   verify unless `trust_unverified_len` is set
    pub fn into_bytes(self, options: &GatewayOptions) -> Result<Vec<u8>, GatewayError> {
        match self {
            NativeOutcome::Failure { status, buffer } => {
                if let Some(buffer) = &buffer {
                    log::warn!(
                        "native call failed with status {} but returned buffer {:p}; releasing it unread",
                        status,
                        buffer.as_ptr()
                    );
                }
                Err(GatewayError::ConversionFailed(status))
            }
            NativeOutcome::Success { buffer: None, .. } => Err(
                GatewayError::InvalidExternalResponse("output buffer is NULL".to_string()),
            ),
            NativeOutcome::Success {
                buffer: Some(buffer),
                reported_len,
            } => {
                let len = checked_output_len(&buffer, reported_len, options)?;
                // SAFETY: `len` is within the allocation, or the caller opted
                // into trusting lengths the provider cannot verify.
                Ok(unsafe { buffer.copy_prefix(len) })
            }
        }
    }

    /// Status code of the call
    pub fn status(&self) -> i32 {
        match self {
            NativeOutcome::Success { .. } => STATUS_SUCCESS,
            NativeOutcome::Failure { status, .. } => *status,
        }
    }
}

impl<P: ConversionProvider + ?Sized> fmt::Debug for NativeOutcome<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeOutcome::Success {
                buffer,
                reported_len,
            } => f
                .debug_struct("Success")
                .field("buffer", buffer)
                .field("reported_len", reported_len)
                .finish(),
            NativeOutcome::Failure { status, buffer } => f
                .debug_struct("Failure")
                .field("status", status)
                .field("buffer", buffer)
                .finish(),
        }
    }
}

fn checked_output_len<P: ConversionProvider + ?Sized>(
    buffer: &ExternalBuffer<'_, P>,
    reported_len: i64,
    options: &GatewayOptions,
) -> Result<usize, GatewayError> {
    let len = usize::try_from(reported_len).map_err(|_| {
        GatewayError::InvalidExternalResponse(format!("negative output length {reported_len}"))
    })?;

    let limit = options.max_output_len.min(isize::MAX as usize);
    if len > limit {
        return Err(GatewayError::InvalidExternalResponse(format!(
            "output length {len} exceeds limit of {limit} bytes"
        )));
    }

    match buffer.available() {
        Some(available) if len > available => Err(GatewayError::InvalidExternalResponse(format!(
            "output length {len} exceeds allocation of {available} bytes"
        ))),
        Some(_) => Ok(len),
        None if len == 0 => Ok(0),
        None if options.trust_unverified_len => {
            log::warn!(
                "output length {} is unverified: provider cannot report allocation sizes",
                len
            );
            Ok(len)
        }
        None => Err(GatewayError::InvalidExternalResponse(format!(
            "output length {len} cannot be verified against the allocation"
        ))),
    }
}

/// A finished conversion with its bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// Converted document, owned by the caller
    pub output: Vec<u8>,
    /// Palm database header of the input, if it had one
    pub header: Option<PalmDbHeader>,
    /// Input size in bytes
    pub input_len: usize,
    /// Time spent in validation, the native call and the copy
    pub elapsed: Duration,
    /// BLAKE3 digest of `output`
    pub fingerprint: Fingerprint,
}

/// Converts documents through an injected [`ConversionProvider`]
pub struct ConversionGateway<P> {
    provider: P,
    options: GatewayOptions,
}

impl<P: ConversionProvider> ConversionGateway<P> {
    /// Create a gateway with default options
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, GatewayOptions::default())
    }

    /// Create a gateway with custom options
    pub fn with_options(provider: P, options: GatewayOptions) -> Self {
        Self { provider, options }
    }

    /// The injected provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The gateway options
    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Perform the raw native call and return its tagged outcome
    ///
    /// No input validation beyond the length conversion is done here.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the input length does not fit in an `i64`
    /// - `Internal` if the provider panicked (any buffer it wrote is released)
    pub fn invoke(&self, input: &[u8]) -> Result<NativeOutcome<'_, P>, GatewayError> {
        let input_len = i64::try_from(input.len()).map_err(|_| {
            GatewayError::InvalidInput(format!("input length {} exceeds i64", input.len()))
        })?;

        let mut output: *mut u8 = ptr::null_mut();
        let mut output_len: i64 = 0;

        log::debug!(
            "invoking {} provider with {} input bytes",
            self.provider.name(),
            input_len
        );

        let call = panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: `input` is a live slice of exactly `input_len` bytes;
            // `output` and `output_len` are writable locals pre-set to NULL/0.
            unsafe {
                self.provider
                    .invoke(input.as_ptr(), input_len, &mut output, &mut output_len)
            }
        }));

        // SAFETY: a non-NULL `output` was written by this provider's `invoke`
        // during this call and has no other owner.
        let buffer = unsafe { ExternalBuffer::adopt(output, &self.provider) };

        match call {
            Ok(STATUS_SUCCESS) => Ok(NativeOutcome::Success {
                buffer,
                reported_len: output_len,
            }),
            Ok(status) => Ok(NativeOutcome::Failure { status, buffer }),
            Err(_) => {
                drop(buffer);
                Err(GatewayError::Internal(
                    "Internal panic during native conversion".to_string(),
                ))
            }
        }
    }

    /// Convert `input`, returning exactly the bytes reported by the callee
    ///
    /// # Errors
    ///
    /// See [`GatewayError`]; no foreign memory is leaked on any path.
    pub fn convert(&self, input: &[u8]) -> Result<Vec<u8>, GatewayError> {
        self.validate_and_copy(input).map(|(_, output)| output)
    }

    /// Convert `input` and report timing and an output fingerprint
    pub fn convert_with_report(&self, input: &[u8]) -> Result<ConversionReport, GatewayError> {
        let start = Instant::now();
        let (header, output) = self.validate_and_copy(input)?;
        let elapsed = start.elapsed();
        let fingerprint = Fingerprint::of(&output);

        log::info!(
            "converted {} bytes into {} bytes in {:?} (blake3 {})",
            input.len(),
            output.len(),
            elapsed,
            fingerprint.short()
        );

        Ok(ConversionReport {
            output,
            header,
            input_len: input.len(),
            elapsed,
            fingerprint,
        })
    }

    fn validate_and_copy(
        &self,
        input: &[u8],
    ) -> Result<(Option<PalmDbHeader>, Vec<u8>), GatewayError> {
        let header = self.options.validator.validate(input)?;
        if let Some(header) = &header {
            log::debug!("input database {}", header);
        }

        let outcome = self.invoke(input)?;
        let status = outcome.status();
        let result = outcome.into_bytes(&self.options);
        if let Err(e) = &result {
            log::debug!("native call returned status {}: {}", status, e);
        }
        result.map(|output| (header, output))
    }
}

impl<P: ConversionProvider + Send + Sync + 'static> ConversionGateway<P> {
    /// Convert on a dedicated worker thread, giving up after `timeout`
    ///
    /// `Duration::ZERO` waits without limit on the calling thread. The native
    /// call cannot be cancelled: after a timeout the worker keeps running and
    /// releases the output buffer when the call eventually returns.
    ///
    /// Each timed-out call leaves its worker detached and still blocked in
    /// the provider. Retrying after `Timeout` against a provider that hangs
    /// therefore accumulates blocked threads, one per attempt, and each keeps
    /// its own `Arc` to this gateway alive. Callers that retry should bound
    /// the number of attempts.
    ///
    /// # Errors
    ///
    /// `Timeout` if no result arrived in time, plus everything
    /// [`convert_with_report`](Self::convert_with_report) returns.
    pub fn convert_with_timeout(
        self: &Arc<Self>,
        input: Vec<u8>,
        timeout: Duration,
    ) -> Result<ConversionReport, GatewayError> {
        if timeout.is_zero() {
            return self.convert_with_report(&input);
        }

        let (tx, rx) = mpsc::channel();
        let gateway = Arc::clone(self);
        thread::Builder::new()
            .name("mobiconvert-worker".to_string())
            .spawn(move || {
                // Receiver may be gone after a timeout.
                let _ = tx.send(gateway.convert_with_report(&input));
            })
            .map_err(|e| GatewayError::Internal(format!("cannot spawn worker: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("conversion did not finish within {:?}", timeout);
                Err(GatewayError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(GatewayError::Internal(
                "worker exited without a result".to_string(),
            )),
        }
    }
}

impl<P: ConversionProvider> fmt::Debug for ConversionGateway<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionGateway")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Answers with a fixed status and a static buffer; counts releases.
    struct Scripted {
        status: i32,
        data: &'static [u8],
        reported_len: i64,
        write_pointer: bool,
        knows_size: bool,
        releases: Cell<usize>,
    }

    impl Scripted {
        fn new(status: i32, data: &'static [u8], reported_len: i64, write_pointer: bool) -> Self {
            Self {
                status,
                data,
                reported_len,
                write_pointer,
                knows_size: true,
                releases: Cell::new(0),
            }
        }

        fn without_size(mut self) -> Self {
            self.knows_size = false;
            self
        }
    }

    impl ConversionProvider for Scripted {
        unsafe fn invoke(
            &self,
            _input: *const u8,
            _input_len: i64,
            output: *mut *mut u8,
            output_len: *mut i64,
        ) -> i32 {
            unsafe {
                if self.write_pointer {
                    *output = self.data.as_ptr().cast_mut();
                }
                *output_len = self.reported_len;
            }
            self.status
        }

        unsafe fn release(&self, _buffer: *mut u8) {
            self.releases.set(self.releases.get() + 1);
        }

        unsafe fn allocation_size(&self, _buffer: *const u8) -> Option<usize> {
            self.knows_size.then_some(self.data.len())
        }
    }

    static REGION: [u8; 64] = [7; 64];

    #[test]
    fn test_success_copies_and_releases() {
        let gateway = ConversionGateway::new(Scripted::new(0, b"epub-bytes", 10, true));
        assert_eq!(gateway.convert(b"azw3").unwrap(), b"epub-bytes");
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_failure_with_null_pointer_releases_nothing() {
        let gateway = ConversionGateway::new(Scripted::new(1, b"", 0, false));
        assert!(matches!(
            gateway.convert(b"azw3"),
            Err(GatewayError::ConversionFailed(1))
        ));
        assert_eq!(gateway.provider().releases.get(), 0);
    }

    #[test]
    fn test_outcome_exposes_status() {
        let gateway = ConversionGateway::new(Scripted::new(3, b"", 0, false));
        let outcome = gateway.invoke(b"x").unwrap();
        assert_eq!(outcome.status(), 3);
        assert!(matches!(outcome, NativeOutcome::Failure { buffer: None, .. }));
    }

    #[test]
    fn test_negative_length_rejected() {
        let gateway = ConversionGateway::new(Scripted::new(0, b"abc", -1, true));
        match gateway.convert(b"x") {
            Err(GatewayError::InvalidExternalResponse(msg)) => assert!(msg.contains("negative")),
            other => panic!("expected InvalidExternalResponse, got {other:?}"),
        }
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_length_above_allocation_rejected() {
        let gateway = ConversionGateway::new(Scripted::new(0, b"abc", 4, true));
        assert!(matches!(
            gateway.convert(b"x"),
            Err(GatewayError::InvalidExternalResponse(_))
        ));
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_length_above_configured_maximum_rejected() {
        let options = GatewayOptions {
            max_output_len: 2,
            ..GatewayOptions::default()
        };
        let gateway = ConversionGateway::with_options(Scripted::new(0, b"abc", 3, true), options);
        assert!(matches!(
            gateway.convert(b"x"),
            Err(GatewayError::InvalidExternalResponse(_))
        ));
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_unknown_size_rejects_non_empty_output() {
        // 32 bytes claimed inside a 64-byte region the provider cannot size.
        let gateway = ConversionGateway::new(Scripted::new(0, &REGION, 32, true).without_size());
        match gateway.convert(b"x") {
            Err(GatewayError::InvalidExternalResponse(msg)) => {
                assert!(msg.contains("cannot be verified"), "{msg}")
            }
            other => panic!("expected InvalidExternalResponse, got {other:?}"),
        }
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_unknown_size_allows_empty_output() {
        let gateway = ConversionGateway::new(Scripted::new(0, &REGION, 0, true).without_size());
        assert_eq!(gateway.convert(b"x").unwrap(), b"");
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_unknown_size_copies_when_trusted() {
        let options = GatewayOptions {
            trust_unverified_len: true,
            ..GatewayOptions::default()
        };
        let gateway = ConversionGateway::with_options(
            Scripted::new(0, &REGION, 32, true).without_size(),
            options,
        );
        assert_eq!(gateway.convert(b"x").unwrap(), &REGION[..32]);
        assert_eq!(gateway.provider().releases.get(), 1);
    }

    #[test]
    fn test_report_and_plain_convert_agree() {
        let gateway = ConversionGateway::new(Scripted::new(0, b"epub", 4, true));
        let plain = gateway.convert(b"in").unwrap();
        let report = gateway.convert_with_report(b"in").unwrap();
        assert_eq!(plain, report.output);
        assert_eq!(gateway.provider().releases.get(), 2);

        let failing = ConversionGateway::new(Scripted::new(4, b"", 0, false));
        assert!(matches!(
            failing.convert_with_report(b"in"),
            Err(GatewayError::ConversionFailed(4))
        ));
    }

    #[test]
    fn test_report_fingerprints_output() {
        let gateway = ConversionGateway::new(Scripted::new(0, b"epub", 4, true));
        let report = gateway.convert_with_report(b"in").unwrap();
        assert_eq!(report.output, b"epub");
        assert_eq!(report.input_len, 2);
        assert_eq!(report.header, None);
        assert_eq!(report.fingerprint, Fingerprint::of(b"epub"));
    }
}
