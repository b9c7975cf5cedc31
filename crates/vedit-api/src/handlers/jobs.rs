//! Job submission handlers.
//!
//! Provides REST API endpoints for:
//! - Running a job and waiting for its output files
//! - Queueing a job for the worker fleet

use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use vedit_models::{JobEvent, JobId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response for a job that ran to completion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJobResponse {
    pub job_id: JobId,
    pub output_files: Vec<PathBuf>,
}

/// Response for a queued job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobResponse {
    pub job_id: JobId,
    pub message_id: String,
}

/// Accepts either an event envelope or a bare request.
fn parse_event(body: &[u8]) -> ApiResult<JobEvent> {
    JobEvent::decode(body).map_err(|e| ApiError::bad_request(format!("invalid job: {}", e)))
}

/// Run a job in-process and return the files it wrote.
///
/// The job is canceled if the server shuts down before it finishes.
pub async fn run_job(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<RunJobResponse>> {
    let event = parse_event(&body)?;
    let job_id = event.job_id();
    let production = state.config.is_production();

    info!(job_id = %job_id, input = %event.request.input.file_path, "Running job");

    let output_files = state
        .handler
        .handle(job_id.clone(), event.request, state.shutdown.clone())
        .await
        .map_err(|e| ApiError::from(e).redact(production))?;

    Ok(Json(RunJobResponse { job_id, output_files }))
}

/// Publish a job to the event stream.
pub async fn enqueue_job(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<EnqueueJobResponse>)> {
    let mut event = parse_event(&body)?;
    let job_id = event.job_id();
    event.id = Some(job_id.clone());

    let message_id = state
        .publisher
        .publish(&event)
        .await
        .map_err(|e| ApiError::from(e).redact(state.config.is_production()))?;

    info!(job_id = %job_id, message_id = %message_id, "Job enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueJobResponse { job_id, message_id }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use vedit_media::{BuildError, RunError};
    use vedit_models::JobRequest;
    use vedit_queue::{EventSource, MemoryEventSource};
    use vedit_worker::{JobError, JobHandler};

    use crate::config::ApiConfig;
    use crate::routes::create_router;

    type Outcome = Box<dyn Fn(&JobRequest) -> Result<Vec<PathBuf>, JobError> + Send + Sync>;

    struct FakeHandler(Outcome);

    #[async_trait]
    impl JobHandler for FakeHandler {
        async fn handle(
            &self,
            _job_id: JobId,
            request: JobRequest,
            _cancel: watch::Receiver<bool>,
        ) -> Result<Vec<PathBuf>, JobError> {
            (self.0)(&request)
        }
    }

    fn app(
        outcome: impl Fn(&JobRequest) -> Result<Vec<PathBuf>, JobError> + Send + Sync + 'static,
        publisher: Arc<MemoryEventSource>,
    ) -> axum::Router {
        app_with_config(ApiConfig::default(), outcome, publisher)
    }

    fn app_with_config(
        config: ApiConfig,
        outcome: impl Fn(&JobRequest) -> Result<Vec<PathBuf>, JobError> + Send + Sync + 'static,
        publisher: Arc<MemoryEventSource>,
    ) -> axum::Router {
        let (_tx, rx) = watch::channel(false);
        let state = AppState::from_parts(
            config,
            Arc::new(FakeHandler(Box::new(outcome))),
            publisher,
            rx,
        );
        create_router(state, None)
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn thumbnail_request() -> String {
        serde_json::to_string(&JobRequest::new("in.mp4", "thumb.jpg").with_frame_count("1")).unwrap()
    }

    #[tokio::test]
    async fn test_run_job_returns_output_files() {
        let app = app(
            |req| Ok(vec![PathBuf::from("/tmp").join(&req.output.file_pattern)]),
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", thumbnail_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["outputFiles"][0], "/tmp/thumb.jpg");
        assert!(!body["jobId"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = app(
            |_| panic!("handler must not run"),
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", "{\"input\":")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_request_is_bad_request() {
        let app = app(
            |_| Err(JobError::InvalidRequest(BuildError::EmptyInput)),
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", thumbnail_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("input file is required"));
    }

    #[tokio::test]
    async fn test_execution_failure_is_unprocessable() {
        let app = app(
            |_| {
                Err(JobError::ExecutionFailed(RunError::NonZeroExit {
                    code: 1,
                    stderr_tail: "in.mp4: No such file or directory".to_string(),
                }))
            },
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", thumbnail_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["diagnostics"], "in.mp4: No such file or directory");
    }

    #[tokio::test]
    async fn test_internal_errors_are_redacted_in_production() {
        let config = ApiConfig {
            environment: "production".to_string(),
            ..ApiConfig::default()
        };
        let app = app_with_config(
            config,
            |_| Err(JobError::OutputResolution("cannot scan /srv/media".to_string())),
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", thumbnail_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(!detail.contains("/srv/media"), "leaked: {detail}");
    }

    #[tokio::test]
    async fn test_internal_errors_are_detailed_in_development() {
        let app = app(
            |_| Err(JobError::OutputResolution("cannot scan /srv/media".to_string())),
            Arc::new(MemoryEventSource::new()),
        );

        let response = app.oneshot(post("/api/jobs", thumbnail_request())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("/srv/media"));
    }

    #[tokio::test]
    async fn test_enqueue_publishes_event() {
        let source = Arc::new(MemoryEventSource::new());
        let app = app(|_| panic!("handler must not run"), source.clone());

        let response = app
            .oneshot(post("/api/jobs/enqueue", thumbnail_request()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;

        let batch = source.poll().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(body["messageId"], batch[0].id.as_str());

        let event = JobEvent::decode(&batch[0].payload).unwrap();
        assert_eq!(event.job_id().as_str(), body["jobId"].as_str().unwrap());
        assert_eq!(event.request.output.file_pattern, "thumb.jpg");
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(|_| Ok(vec![]), Arc::new(MemoryEventSource::new()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }
}
