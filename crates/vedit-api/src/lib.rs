//! Axum HTTP API server.
//!
//! This crate provides:
//! - Synchronous job execution over HTTP
//! - Job submission to the worker event stream
//! - Health and Prometheus endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
