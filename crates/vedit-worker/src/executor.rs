//! Job executor.
//!
//! Turns one `JobRequest` into one FFmpeg run: build the command, run it
//! under the cancellation signal, check what was written, and hand the
//! outcome to the notifier.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use vedit_media::{locate_ffmpeg, BuiltCommand, CommandBuilder, OutputSnapshot, ProcessRunner};
use vedit_models::{JobId, JobRequest, JobResult};

use crate::config::WorkerConfig;
use crate::error::{JobError, WorkerResult};
use crate::logging::job_span;
use crate::metrics;
use crate::notifier::Notifier;

/// Something that can run a job to completion.
///
/// The intake loop and the HTTP API both dispatch through this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run `request` and return the files it produced.
    async fn handle(
        &self,
        job_id: JobId,
        request: JobRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<PathBuf>, JobError>;
}

/// Runs jobs with a local FFmpeg binary.
pub struct JobExecutor {
    builder: CommandBuilder,
    runner: ProcessRunner,
    notifier: Notifier,
}

impl JobExecutor {
    /// Create an executor using the given FFmpeg binary.
    pub fn new(config: &WorkerConfig, ffmpeg_path: impl Into<PathBuf>) -> WorkerResult<Self> {
        Ok(Self {
            builder: CommandBuilder::new(ffmpeg_path, &config.output_dir),
            runner: ProcessRunner::new()
                .with_timeout(config.job_timeout)
                .with_capture_limit(config.capture_limit),
            notifier: Notifier::new(config)?,
        })
    }

    /// Create an executor, resolving FFmpeg from config or `PATH`.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let ffmpeg = locate_ffmpeg(config.ffmpeg_path.as_deref())?;
        Self::new(config, ffmpeg)
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    /// Run a built command and collect the outputs it wrote.
    ///
    /// Returns the outcome together with whatever FFmpeg wrote to stderr.
    async fn run_command(
        &self,
        command: BuiltCommand,
        cancel: watch::Receiver<bool>,
    ) -> (Result<Vec<PathBuf>, JobError>, String) {
        let output_path = command.output().to_path_buf();

        let snapshot = match OutputSnapshot::capture(&output_path).await {
            Ok(snapshot) => snapshot,
            Err(e) => return (Err(JobError::OutputResolution(e.to_string())), String::new()),
        };

        let process = match self.runner.run(command, cancel).await {
            Ok(process) => process,
            Err(e) => {
                let err = JobError::from(e);
                let diagnostics = err.diagnostics().to_string();
                return (Err(err), diagnostics);
            }
        };

        let files = match snapshot.produced().await {
            Ok(files) if files.is_empty() => Err(JobError::OutputMissing(output_path)),
            Ok(files) => Ok(files),
            Err(e) => Err(JobError::OutputResolution(e.to_string())),
        };

        (files, process.stderr)
    }
}

#[async_trait]
impl JobHandler for JobExecutor {
    async fn handle(
        &self,
        job_id: JobId,
        request: JobRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<PathBuf>, JobError> {
        let span = job_span(&job_id, &request);

        async move {
            let command = match self.builder.build(&request) {
                Ok(command) => command,
                Err(e) => {
                    warn!(error = %e, "Rejected job request");
                    metrics::record_job("rejected", 0.0);
                    return Err(e.into());
                }
            };

            info!(command = %command.display(), "Job started");
            let started = Instant::now();

            let (result, diagnostics) = self.run_command(command, cancel).await;
            let elapsed = started.elapsed();

            let report = match &result {
                Ok(files) => {
                    info!(files = files.len(), elapsed = ?elapsed, "Job completed");
                    JobResult::succeeded(job_id, files.clone(), diagnostics)
                }
                Err(e) if e.is_canceled() => {
                    warn!(elapsed = ?elapsed, "Job canceled");
                    JobResult::failed(job_id, e.to_string(), diagnostics)
                }
                Err(e) => {
                    error!(error = %e, elapsed = ?elapsed, "Job failed");
                    JobResult::failed(job_id, e.to_string(), diagnostics)
                }
            };

            let label = match &result {
                Err(e) if e.is_canceled() => "canceled",
                _ => report.outcome.as_str(),
            };
            metrics::record_job(label, elapsed.as_secs_f64());

            if let Some(url) = request.webhook_url() {
                self.notifier.notify(report.with_webhook(Some(url.to_string())));
            }

            result
        }
        .instrument(span)
        .await
    }
}
