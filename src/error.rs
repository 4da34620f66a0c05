use std::fmt;
use std::process::{ExitCode, Termination};

/// Which phase of the pipeline a fatal error occurred in.
///
/// Exit codes are assigned per phase rather than per individual error
/// variant, matching the table in the spec: usage/allocation failures exit
/// 1, sink open/write failures exit 2, source read and readiness-multiplexer
/// failures exit 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Usage,
    Alloc,
    SinkOpen,
    SinkWrite,
    SourceRead,
    Poll,
}

impl Phase {
    fn exit_code(self) -> u8 {
        match self {
            Phase::Usage | Phase::Alloc => 1,
            Phase::SinkOpen | Phase::SinkWrite => 2,
            Phase::SourceRead | Phase::Poll => 3,
        }
    }
}

/// A fatal error, tagged with the phase that produced it so `main` can pick
/// the right exit code without re-inspecting the message.
#[derive(Debug)]
pub struct CliError {
    phase: Phase,
    message: String,
    source: Option<std::io::Error>,
}

impl CliError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        CliError { phase, message: message.into(), source: None }
    }

    pub fn with_source(phase: Phase, message: impl Into<String>, source: std::io::Error) -> Self {
        CliError { phase, message: message.into(), source: Some(source) }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(Phase::Usage, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(e) => write!(f, "{}: {}", self.message, e),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Wraps `CliError` so `main` can return `Result<(), CliMain>` and let
/// `std::process::Termination` pick the exit code, the way the teacher's
/// commands return `anyhow::Result<()>` and dispatch through `.report()`.
pub struct CliMain(pub Result<(), CliError>);

impl Termination for CliMain {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("teefan: {e}");
                ExitCode::from(e.phase.exit_code())
            }
        }
    }
}

impl From<Result<(), CliError>> for CliMain {
    fn from(r: Result<(), CliError>) -> Self {
        CliMain(r)
    }
}
