use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// The part of a run a process or failure belongs to.
///
/// Every error that can abort a run names its stage, so a failed run can tell the user where it
/// went wrong.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Stage {
    /// The server being profiled.
    Target,
    /// The sampling profiler attached to the target.
    Sampler,
    /// The synthetic requests fired at the target.
    Load,
    /// Dumping the raw capture to text.
    Dump,
    /// Folding the dumped stacks into weighted lines.
    Collapse,
    /// Plotting the folded stacks.
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Target => "target",
            Stage::Sampler => "sampler",
            Stage::Load => "load",
            Stage::Dump => "dump",
            Stage::Collapse => "collapse",
            Stage::Render => "render",
        };
        f.write_str(name)
    }
}

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A process could not be started.
    #[error("{stage}: failed to launch `{program}`: {source}")]
    Launch {
        /// Stage the process belongs to.
        stage: Stage,
        /// Program that was being started.
        program: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A process exited while a later stage still depended on it.
    #[error("{stage}: process {pid} exited unexpectedly ({status})")]
    UnexpectedExit {
        /// Stage the process belongs to.
        stage: Stage,
        /// Process id.
        pid: u32,
        /// How the process ended.
        status: ExitStatus,
    },

    /// A bounded wait ran out.
    #[error("{stage}: process {pid} still running after {waited:?}")]
    Timeout {
        /// Stage the process belongs to.
        stage: Stage,
        /// Process id.
        pid: u32,
        /// How long we waited.
        waited: Duration,
    },

    /// A render stage ran to completion but reported failure.
    #[error("{stage}: stage exited with {status}")]
    StageFailed {
        /// The failing stage.
        stage: Stage,
        /// Its exit status.
        status: ExitStatus,
    },

    /// An output a stage promised is missing or empty.
    #[error("{stage}: expected output {} is missing or empty", path.display())]
    MissingArtifact {
        /// The stage that should have produced the file.
        stage: Stage,
        /// Where the file should be.
        path: PathBuf,
    },

    /// An operation was invoked in a state that does not allow it.
    #[error("{stage}: {reason}")]
    Precondition {
        /// Stage whose state machine was violated.
        stage: Stage,
        /// What went wrong.
        reason: &'static str,
    },

    /// The termination signal could not be delivered.
    #[error("{stage}: failed to signal process {pid}: {source}")]
    Signal {
        /// Stage the process belongs to.
        stage: Stage,
        /// Process id.
        pid: u32,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure while driving a stage.
    #[error("{stage}: {source}")]
    Io {
        /// The affected stage.
        stage: Stage,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A command line could not be split into words.
    #[error("invalid command line `{line}`: {reason}")]
    InvalidCommand {
        /// The offending input.
        line: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl Error {
    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match *self {
            Error::Launch { stage, .. }
            | Error::UnexpectedExit { stage, .. }
            | Error::Timeout { stage, .. }
            | Error::StageFailed { stage, .. }
            | Error::MissingArtifact { stage, .. }
            | Error::Precondition { stage, .. }
            | Error::Signal { stage, .. }
            | Error::Io { stage, .. } => Some(stage),
            Error::InvalidCommand { .. } => None,
        }
    }

    /// Process exit code for this kind of failure.
    ///
    /// `2` is left to the argument parser.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Launch { .. } => 3,
            Error::UnexpectedExit { .. } => 4,
            Error::Timeout { .. } => 5,
            Error::StageFailed { .. } => 6,
            Error::MissingArtifact { .. } => 7,
            Error::Precondition { .. } => 8,
            Error::Signal { .. } | Error::Io { .. } | Error::InvalidCommand { .. } => 1,
        }
    }
}

/// Why a single shot failed. Shot failures are counted, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ShotFailure {
    /// The request process could not be started.
    #[error("could not launch request: {0}")]
    Launch(#[source] io::Error),

    /// The request process exited unsuccessfully.
    #[error("request exited with {0}")]
    Status(ExitStatus),

    /// The request did not finish within the shot timeout.
    #[error("request still running after {0:?}")]
    Timeout(Duration),

    /// Waiting for the request failed.
    #[error("could not wait for request: {0}")]
    Wait(#[source] io::Error),
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
