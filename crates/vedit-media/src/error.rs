//! Error types for media operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for command building.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for process execution.
pub type RunResult<T> = Result<T, RunError>;

/// Result type for other media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// The request cannot be turned into a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("input file is required")]
    EmptyInput,

    #[error("output file pattern is required")]
    EmptyOutputPattern,

    #[error("invalid start time '{0}', expected HH:MM:SS.ms")]
    InvalidStartTime(String),

    #[error("invalid frame count '{0}', expected a non-negative integer")]
    InvalidFrameCount(String),
}

/// The external processor did not complete successfully.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process exited with status {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    #[error("process terminated by signal: {stderr_tail}")]
    Terminated { stderr_tail: String },

    #[error("operation cancelled")]
    Canceled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// Whether the run ended because somebody asked it to stop.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RunError::Canceled)
    }

    /// Captured stderr, if the process got far enough to produce any.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            RunError::NonZeroExit { stderr_tail, .. } | RunError::Terminated { stderr_tail } => {
                Some(stderr_tail)
            }
            _ => None,
        }
    }
}

/// Errors outside building and running a command.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
