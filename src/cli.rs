use clap::Parser;

use crate::error::{CliError, Phase};

const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Fan a stdin byte stream out to one or more output files, without letting
/// any single slow sink stall the others.
#[derive(Parser, Debug)]
#[command(name = "teefan", about = "Fan stdin out to N output files")]
pub struct Cli {
    /// Buffer chunk size, in bytes
    #[arg(short = 'b', long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Scatter the input across outputs instead of replicating it
    #[arg(short = 's', long = "scatter")]
    scatter: bool,

    /// Align scattered partitions on newline boundaries (only meaningful with -s)
    #[arg(short = 'l', long = "line")]
    line: bool,

    /// Increase logging verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output file paths
    #[arg(required = true)]
    files: Vec<String>,
}

/// Runtime configuration derived from parsed CLI flags.
///
/// Kept distinct from `Cli` so the event loop and scheduler never depend on
/// `clap` types directly, following the teacher's pattern of converting a
/// per-command `*Cli` struct into plain data before doing real work.
#[derive(Debug, Clone)]
pub struct Config {
    pub buffer_size: usize,
    pub scatter: bool,
    pub line: bool,
    pub files: Vec<String>,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn into_config(self) -> Result<Config, CliError> {
        if self.buffer_size == 0 {
            return Err(CliError::usage("buffer size must be positive"));
        }
        if self.line && !self.scatter {
            log::warn!("-l has no effect without -s");
        }
        Ok(Config {
            buffer_size: self.buffer_size,
            scatter: self.scatter,
            line: self.line,
            files: self.files,
        })
    }
}

/// Parse `argv`, mapping clap's own usage failures to a `Phase::Usage` error
/// so the exit code convention in the spec (1 for any usage problem) holds
/// regardless of which layer detects the bad input.
pub fn parse(argv: Vec<String>) -> Result<Cli, CliError> {
    use clap::error::ErrorKind;

    Cli::try_parse_from(argv).map_err(|e| match e.kind() {
        // --help/--version are not usage errors: let clap print and exit 0.
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => CliError::new(Phase::Usage, e.to_string()),
    })
}
