//! Input validation before the native call
//!
//! The native library trusts its input completely, so obviously unsuitable
//! inputs are rejected on the Rust side where the failure can be reported
//! cleanly:
//!
//! 1. **Size limit**: inputs above `max_input_len` are refused
//! 2. **Container check** (opt-in): the input must start with a Palm database
//!    header of type `BOOK` or `TEXt`
//!
//! Empty input passes when the container check is off; the library decides
//! what to do with it.

use crate::error::GatewayError;
use crate::metadata::PalmDbHeader;

/// Default maximum input size (512 MiB)
pub const DEFAULT_MAX_INPUT_LEN: usize = 512 * 1024 * 1024;

/// Checks applied to every input before it crosses the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputValidator {
    max_input_len: usize,
    require_ebook_header: bool,
}

impl InputValidator {
    /// Create a validator with the default limits and no container check
    pub fn new() -> Self {
        Self {
            max_input_len: DEFAULT_MAX_INPUT_LEN,
            require_ebook_header: false,
        }
    }

    /// Create a validator with custom settings
    pub fn with_limits(max_input_len: usize, require_ebook_header: bool) -> Self {
        Self {
            max_input_len,
            require_ebook_header,
        }
    }

    /// Maximum accepted input size in bytes
    pub fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    /// Validate `input`, returning its Palm database header when present
    ///
    /// # Errors
    ///
    /// `GatewayError::InvalidInput` if the input is too large, or if the
    /// container check is enabled and the input is not an e-book database.
    pub fn validate(&self, input: &[u8]) -> Result<Option<PalmDbHeader>, GatewayError> {
        if input.len() > self.max_input_len {
            return Err(GatewayError::InvalidInput(format!(
                "input is {} bytes, limit is {}",
                input.len(),
                self.max_input_len
            )));
        }

        let header = PalmDbHeader::parse(input);

        if self.require_ebook_header {
            match &header {
                None => {
                    return Err(GatewayError::InvalidInput(
                        "input is too short for a Palm database header".to_string(),
                    ));
                }
                Some(h) if !h.is_ebook() => {
                    return Err(GatewayError::InvalidInput(format!(
                        "unsupported database type '{}'",
                        h.type_str()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(header)
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}
