//! Shared data models for the vedit media job service.
//!
//! This crate provides Serde-serializable types for:
//! - Job requests (input, output pattern, seek, filters, extra options)
//! - Event envelopes carried on the job stream
//! - Job results delivered to webhooks

pub mod job;
pub mod request;

// Re-export common types
pub use job::{JobId, JobOutcome, JobResult};
pub use request::{JobEvent, JobInput, JobOutput, JobRequest};
