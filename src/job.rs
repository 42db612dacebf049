//! File-to-file conversion

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::gateway::{ConversionGateway, ConversionReport};
use crate::provider::ConversionProvider;

/// Extension given to outputs when no output path is supplied
pub const DEFAULT_OUTPUT_EXTENSION: &str = "epub";

/// One input file converted into one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    /// Document to read
    pub input: PathBuf,
    /// Destination of the converted document
    pub output: PathBuf,
    /// Worker timeout; `Duration::ZERO` waits forever on the calling thread
    pub timeout: Duration,
}

impl FileJob {
    /// Create a job, deriving the output path from the input when absent
    ///
    /// ```rust
    /// use mobiconvert_gateway::job::FileJob;
    /// use std::path::Path;
    ///
    /// let job = FileJob::new("books/test.azw3", None);
    /// assert_eq!(job.output, Path::new("books/test.epub"));
    /// ```
    pub fn new(input: impl Into<PathBuf>, output: Option<PathBuf>) -> Self {
        let input = input.into();
        let output = output.unwrap_or_else(|| input.with_extension(DEFAULT_OUTPUT_EXTENSION));
        Self {
            input,
            output,
            timeout: Duration::ZERO,
        }
    }

    /// Set the worker timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the input, convert it and write the output
    ///
    /// The output file is only created after a successful conversion.
    ///
    /// # Errors
    ///
    /// `GatewayError::Io` for unreadable input or unwritable output, plus
    /// every conversion error.
    pub fn run<P>(&self, gateway: &Arc<ConversionGateway<P>>) -> Result<ConversionReport, GatewayError>
    where
        P: ConversionProvider + Send + Sync + 'static,
    {
        let input = read_input(&self.input)?;
        log::info!("read {} bytes from {}", input.len(), self.input.display());

        let report = gateway.convert_with_timeout(input, self.timeout)?;

        write_output(&self.output, &report.output)?;
        log::info!(
            "wrote {} bytes to {}",
            report.output.len(),
            self.output.display()
        );
        Ok(report)
    }
}

/// Convert `input_path` into `output_path` on the calling thread
pub fn convert_file<P: ConversionProvider>(
    gateway: &ConversionGateway<P>,
    input_path: &Path,
    output_path: &Path,
) -> Result<ConversionReport, GatewayError> {
    let input = read_input(input_path)?;
    let report = gateway.convert_with_report(&input)?;
    write_output(output_path, &report.output)?;
    Ok(report)
}

fn read_input(path: &Path) -> Result<Vec<u8>, GatewayError> {
    fs::read(path).map_err(|e| GatewayError::io(path, e))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), GatewayError> {
    fs::write(path, bytes).map_err(|e| GatewayError::io(path, e))
}
