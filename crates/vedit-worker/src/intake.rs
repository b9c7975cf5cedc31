//! Event intake loop.
//!
//! Polls an `EventSource`, decodes each message on its own and hands the
//! resulting jobs to a `JobHandler`. Messages are committed once their job
//! has finished, so a crash mid-job means redelivery rather than loss.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use vedit_models::JobEvent;
use vedit_queue::{EventSource, RawEvent};

use crate::config::WorkerConfig;
use crate::error::DecodeError;
use crate::executor::JobHandler;
use crate::metrics;

/// Decode one stream message into a job event.
pub fn decode_event(raw: &RawEvent) -> Result<JobEvent, DecodeError> {
    if raw.payload.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    Ok(JobEvent::decode(&raw.payload)?)
}

/// Consumes job events until shut down.
pub struct IntakeLoop {
    source: Arc<dyn EventSource>,
    handler: Arc<dyn JobHandler>,
    max_concurrent_jobs: usize,
    poll_backoff: Duration,
    shutdown_timeout: Duration,
}

impl IntakeLoop {
    pub fn new(source: Arc<dyn EventSource>, handler: Arc<dyn JobHandler>, config: &WorkerConfig) -> Self {
        Self {
            source,
            handler,
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            poll_backoff: config.poll_backoff,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// Running jobs get the same receiver as their cancellation signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting intake loop with {} max concurrent jobs",
            self.max_concurrent_jobs
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                polled = self.source.poll() => polled,
            };

            let events = match polled {
                Ok(events) => events,
                Err(e) => {
                    error!("Error polling events: {}", e);
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.poll_backoff) => {}
                    }
                    continue;
                }
            };

            for raw in events {
                // Anything left in the batch stays pending until the source reclaims it.
                if *shutdown.borrow() {
                    break;
                }

                let event = match decode_event(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(event_id = %raw.id, error = %e, "Skipping undecodable event");
                        debug!("Undecodable payload: {}", raw.payload_lossy());
                        metrics::record_event("malformed");
                        commit(self.source.as_ref(), &raw.id).await;
                        continue;
                    }
                };

                let source = Arc::clone(&self.source);
                let handler = Arc::clone(&self.handler);
                let cancel = shutdown.clone();

                if self.max_concurrent_jobs == 1 {
                    dispatch(source, handler, raw.id, event, cancel).await;
                    continue;
                }

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                in_flight.spawn(async move {
                    let _permit = permit;
                    dispatch(source, handler, raw.id, event, cancel).await;
                });
            }

            while in_flight.try_join_next().is_some() {}
        }

        info!("Shutdown signal received, stopping intake loop");

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight jobs to complete...", in_flight.len());
            let drained = tokio::time::timeout(self.shutdown_timeout, async {
                while in_flight.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!("In-flight jobs did not finish within {:?}, aborting", self.shutdown_timeout);
                in_flight.abort_all();
            }
        }

        info!("Intake loop stopped");
    }
}

async fn dispatch(
    source: Arc<dyn EventSource>,
    handler: Arc<dyn JobHandler>,
    event_id: String,
    event: JobEvent,
    cancel: watch::Receiver<bool>,
) {
    let job_id = event.job_id();
    debug!(job_id = %job_id, event_id = %event_id, "Dispatching job");

    match handler.handle(job_id.clone(), event.request, cancel).await {
        Ok(files) => {
            metrics::record_event("processed");
            debug!(job_id = %job_id, "Job produced {} file(s)", files.len());
        }
        Err(e) if e.is_canceled() => {
            metrics::record_event("canceled");
            info!(job_id = %job_id, event_id = %event_id, "Job canceled, leaving event pending for reclaim");
            return;
        }
        Err(e) => {
            metrics::record_event("failed");
            warn!(job_id = %job_id, error = %e, "Job failed");
        }
    }

    commit(source.as_ref(), &event_id).await;
}

async fn commit(source: &dyn EventSource, event_id: &str) {
    if let Err(e) = source.commit(event_id).await {
        error!(event_id = %event_id, "Failed to commit event: {}", e);
    }
}

/// Resolves once the shutdown flag is set. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
