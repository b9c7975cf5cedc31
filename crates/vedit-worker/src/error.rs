//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Why a single job did not produce its outputs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] vedit_media::BuildError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] vedit_media::RunError),

    #[error("No output written to {0}")]
    OutputMissing(PathBuf),

    #[error("Failed to resolve outputs: {0}")]
    OutputResolution(String),
}

impl JobError {
    /// Whether the job was stopped by cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, JobError::ExecutionFailed(e) if e.is_canceled())
    }

    /// Processor output captured before the failure, if any.
    pub fn diagnostics(&self) -> &str {
        match self {
            JobError::ExecutionFailed(e) => e.stderr_tail().unwrap_or_default(),
            _ => "",
        }
    }
}

/// An event payload that is not a job.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed job event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that stop the worker from starting.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] vedit_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vedit_queue::QueueError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
