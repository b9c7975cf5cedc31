//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vedit_worker::JobError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Job failed: {message}")]
    JobFailed { message: String, diagnostics: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Queue error: {0}")]
    Queue(#[from] vedit_queue::QueueError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Replace internal details with a generic message in production.
    pub fn redact(self, production: bool) -> Self {
        match self {
            ApiError::Internal(_) | ApiError::Queue(_) if production => {
                Self::internal("an internal error occurred")
            }
            other => other,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::JobFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidRequest(e) => ApiError::BadRequest(e.to_string()),
            JobError::OutputResolution(msg) => ApiError::Internal(msg),
            e if e.is_canceled() => ApiError::Unavailable("server is shutting down".to_string()),
            e => ApiError::JobFailed {
                diagnostics: e.diagnostics().to_string(),
                message: e.to_string(),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();

        let diagnostics = match self {
            ApiError::JobFailed { diagnostics, .. } if !diagnostics.is_empty() => Some(diagnostics),
            _ => None,
        };

        (status, Json(ErrorResponse { detail, diagnostics })).into_response()
    }
}
