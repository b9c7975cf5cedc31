//! Prometheus metrics for job processing.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "vedit_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "vedit_job_duration_seconds";
    pub const EVENTS_TOTAL: &str = "vedit_events_total";
    pub const WEBHOOKS_TOTAL: &str = "vedit_webhooks_total";
}

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a finished job.
pub fn record_job(outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record what happened to a consumed event.
pub fn record_event(result: &'static str) {
    counter!(names::EVENTS_TOTAL, "result" => result).increment(1);
}

/// Record a webhook delivery attempt.
pub fn record_webhook(result: &'static str) {
    counter!(names::WEBHOOKS_TOTAL, "result" => result).increment(1);
}
