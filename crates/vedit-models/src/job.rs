//! Job identity and results.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

impl JobOutcome {
    /// Label used in payloads and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
        }
    }
}

/// Result of a finished job, handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    #[serde(rename = "status")]
    pub outcome: JobOutcome,
    pub output_files: Vec<PathBuf>,
    /// Captured processor output
    pub diagnostics: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
    /// Not part of the delivered payload
    #[serde(skip)]
    pub webhook_url: Option<String>,
}

impl JobResult {
    /// Result of a job that produced its outputs.
    pub fn succeeded(job_id: JobId, output_files: Vec<PathBuf>, diagnostics: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome: JobOutcome::Succeeded,
            output_files,
            diagnostics: diagnostics.into(),
            error: None,
            completed_at: Utc::now(),
            webhook_url: None,
        }
    }

    /// Result of a job that failed.
    pub fn failed(job_id: JobId, error: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome: JobOutcome::Failed,
            output_files: Vec::new(),
            diagnostics: diagnostics.into(),
            error: Some(error.into()),
            completed_at: Utc::now(),
            webhook_url: None,
        }
    }

    /// Attach the webhook URL to deliver to.
    pub fn with_webhook(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        let id = JobId::from_string("abc");
        assert_eq!(id.to_string(), "abc");
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_result_payload_shape() {
        let result = JobResult::succeeded(
            JobId::from_string("job-1"),
            vec![PathBuf::from("/tmp/out.jpg")],
            "",
        )
        .with_webhook(Some("http://hook".to_string()));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["outputFiles"][0], "/tmp/out.jpg");
        assert!(value.get("webhookUrl").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failed_result() {
        let result = JobResult::failed(JobId::new(), "boom", "stderr");
        assert_eq!(result.outcome, JobOutcome::Failed);
        assert_eq!(result.outcome.as_str(), "failed");
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.output_files.is_empty());
    }
}
