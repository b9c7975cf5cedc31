//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vedit_media::DEFAULT_CAPTURE_LIMIT;

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// FFmpeg executable; looked up in PATH when unset
    pub ffmpeg_path: Option<String>,
    /// Directory relative output patterns are written to
    pub output_dir: PathBuf,
    /// Kill FFmpeg after this long
    pub job_timeout: Option<Duration>,
    /// Trailing bytes of FFmpeg output kept per stream
    pub capture_limit: usize,
    /// Max diagnostic bytes sent in a webhook payload
    pub diagnostics_limit: usize,
    /// Webhook request timeout
    pub webhook_timeout: Duration,
    /// HMAC key for signing webhook bodies
    pub webhook_secret: Option<String>,
    /// Maximum concurrent jobs per intake loop (1 = inline dispatch)
    pub max_concurrent_jobs: usize,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
    /// Sleep after a failed poll
    pub poll_backoff: Duration,
    /// Port for the Prometheus exporter, if enabled
    pub metrics_port: Option<u16>,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("output_dir", &self.output_dir)
            .field("job_timeout", &self.job_timeout)
            .field("capture_limit", &self.capture_limit)
            .field("diagnostics_limit", &self.diagnostics_limit)
            .field("webhook_timeout", &self.webhook_timeout)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("poll_backoff", &self.poll_backoff)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            output_dir: PathBuf::from("/tmp"),
            job_timeout: None,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            diagnostics_limit: 4 * 1024,
            webhook_timeout: Duration::from_secs(10),
            webhook_secret: None,
            max_concurrent_jobs: 1,
            shutdown_timeout: Duration::from_secs(30),
            poll_backoff: Duration::from_secs(5),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").ok().filter(|s| !s.trim().is_empty()),
            output_dir: std::env::var("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp")),
            job_timeout: std::env::var("JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            capture_limit: std::env::var("CAPTURE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CAPTURE_LIMIT),
            diagnostics_limit: std::env::var("DIAGNOSTICS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4 * 1024),
            webhook_timeout: Duration::from_secs(
                std::env::var("WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            poll_backoff: Duration::from_secs(
                std::env::var("WORKER_POLL_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            metrics_port: if std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
            {
                Some(
                    std::env::var("METRICS_PORT")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(9100),
                )
            } else {
                None
            },
        }
    }
}
