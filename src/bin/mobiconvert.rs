//! Command-line harness: convert one MOBI/AZW3 file through the native library

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use mobiconvert_gateway::ffi::{DEFAULT_CONVERT_SYMBOL, DEFAULT_LIBRARY_NAME};
use mobiconvert_gateway::gateway::DEFAULT_MAX_OUTPUT_LEN;
use mobiconvert_gateway::job::FileJob;
use mobiconvert_gateway::logging;
use mobiconvert_gateway::validation::{DEFAULT_MAX_INPUT_LEN, InputValidator};
use mobiconvert_gateway::{
    ConversionGateway, Deallocator, GatewayError, GatewayOptions, LibraryConfig, NativeLibrary,
};

#[derive(Parser, Debug)]
#[command(
    name = "mobiconvert",
    version,
    about = "Convert a MOBI/AZW3 file to EPUB through the native mobiconvert library"
)]
struct Cli {
    /// Input document
    input: PathBuf,

    /// Output file (defaults to the input path with an .epub extension)
    output: Option<PathBuf>,

    /// Native library to load
    #[arg(long, env = "MOBICONVERT_LIBRARY", default_value = DEFAULT_LIBRARY_NAME)]
    library: PathBuf,

    /// Exported conversion routine
    #[arg(long, env = "MOBICONVERT_SYMBOL", default_value = DEFAULT_CONVERT_SYMBOL)]
    symbol: String,

    /// Release routine for output buffers: local, c or export:<free>[,<size>]
    #[arg(long = "free", value_name = "KIND", env = "MOBICONVERT_FREE")]
    deallocator: Option<Deallocator>,

    /// Give up after this many milliseconds (0 waits forever)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    timeout_ms: u64,

    /// Largest output length accepted from the library
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_OUTPUT_LEN)]
    max_output: usize,

    /// Largest input file passed to the library
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_INPUT_LEN)]
    max_input: usize,

    /// Copy outputs whose length cannot be checked against the allocation
    #[arg(long)]
    trust_reported_length: bool,

    /// Reject inputs without a BOOK/TEXt Palm database header
    #[arg(long)]
    require_ebook: bool,

    /// More log output (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn run(cli: Cli) -> Result<(), GatewayError> {
    let config = LibraryConfig {
        path: cli.library,
        symbol: cli.symbol,
        deallocator: cli.deallocator.unwrap_or_default(),
    };
    let library = NativeLibrary::open(&config)?;

    let options = GatewayOptions {
        max_output_len: cli.max_output,
        validator: InputValidator::with_limits(cli.max_input, cli.require_ebook),
        trust_unverified_len: cli.trust_reported_length,
    };
    let gateway = Arc::new(ConversionGateway::with_options(library, options));

    let job = FileJob::new(cli.input, cli.output)
        .with_timeout(Duration::from_millis(cli.timeout_ms));
    let report = job.run(&gateway)?;

    if !cli.quiet {
        if let Some(header) = &report.header {
            println!("input:  {} ({} bytes)", header, report.input_len);
        }
        println!(
            "output: {} ({} bytes, blake3 {})",
            job.output.display(),
            report.output.len(),
            report.fingerprint.short()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(logging::level_from_verbosity(cli.verbose, cli.quiet)) {
        eprintln!("Error installing logger: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(u8::try_from(e.code()).unwrap_or(1))
        }
    }
}
