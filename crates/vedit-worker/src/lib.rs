//! Media job worker.
//!
//! This crate provides:
//! - Job executor that runs FFmpeg for a `JobRequest`
//! - Event intake loop over any `EventSource`
//! - Webhook notification of job results
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod notifier;

pub use config::WorkerConfig;
pub use error::{DecodeError, JobError, WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandler};
pub use intake::{decode_event, IntakeLoop};
pub use logging::{init_tracing, job_span};
pub use notifier::{Notifier, NotifyError};
