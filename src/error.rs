//! Error types for gateway operations

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that can occur while converting a document through the native library
#[derive(Debug)]
pub enum GatewayError {
    /// Input file missing or unreadable, or output path unwritable
    Io { path: PathBuf, source: io::Error },
    /// External routine returned a non-success status code
    ConversionFailed(i32),
    /// Success status but the output pointer or length cannot be trusted
    InvalidExternalResponse(String),
    /// Input rejected before crossing the boundary
    InvalidInput(String),
    /// Native library or one of its symbols could not be loaded
    Library(String),
    /// Worker did not answer within the configured timeout
    Timeout,
    /// Internal error
    Internal(String),
}

impl GatewayError {
    /// Get numeric error code, also used as the process exit code
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::Io { .. } => 1,
            GatewayError::ConversionFailed(_) => 2,
            GatewayError::InvalidExternalResponse(_) => 3,
            GatewayError::InvalidInput(_) => 4,
            GatewayError::Library(_) => 5,
            GatewayError::Timeout => 6,
            GatewayError::Internal(_) => 99,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GatewayError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            GatewayError::ConversionFailed(status) => {
                write!(f, "Conversion failed with status {}", status)
            }
            GatewayError::InvalidExternalResponse(msg) => {
                write!(f, "Invalid response from native library: {}", msg)
            }
            GatewayError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            GatewayError::Library(msg) => write!(f, "Native library error: {}", msg),
            GatewayError::Timeout => write!(f, "Conversion timeout exceeded"),
            GatewayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<libloading::Error> for GatewayError {
    fn from(err: libloading::Error) -> Self {
        GatewayError::Library(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_nonzero() {
        let errors = [
            GatewayError::io("in.azw3", io::Error::from(io::ErrorKind::NotFound)),
            GatewayError::ConversionFailed(1),
            GatewayError::InvalidExternalResponse("null".into()),
            GatewayError::InvalidInput("big".into()),
            GatewayError::Library("missing".into()),
            GatewayError::Timeout,
            GatewayError::Internal("panic".into()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(GatewayError::code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_mentions_status_and_path() {
        let failed = GatewayError::ConversionFailed(7);
        assert_eq!(failed.to_string(), "Conversion failed with status 7");

        let io_err = GatewayError::io("book.azw3", io::Error::from(io::ErrorKind::NotFound));
        assert!(io_err.to_string().contains("book.azw3"));
        assert!(std::error::Error::source(&io_err).is_some());
    }
}
