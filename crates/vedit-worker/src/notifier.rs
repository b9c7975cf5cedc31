//! Webhook notifier.
//!
//! Delivery is a single bounded-timeout POST. Failures are logged and
//! dropped; there is no retry queue.

use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vedit_models::JobResult;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;

/// Header carrying the HMAC of the request body.
pub const SIGNATURE_HEADER: &str = "X-Vedit-Signature";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("result has no webhook URL")]
    MissingUrl,

    #[error("invalid webhook URL '{0}'")]
    InvalidUrl(String),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sends job results to caller-supplied endpoints.
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    diagnostics_limit: usize,
    secret: Option<String>,
}

impl Notifier {
    /// Create a notifier from worker configuration.
    pub fn new(config: &WorkerConfig) -> WorkerResult<Self> {
        let http = Client::builder().timeout(config.webhook_timeout).build()?;

        Ok(Self {
            http,
            diagnostics_limit: config.diagnostics_limit,
            secret: config.webhook_secret.clone(),
        })
    }

    /// Deliver in the background and return immediately.
    pub fn notify(&self, result: JobResult) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.deliver(&result).await {
                Ok(()) => {
                    metrics::record_webhook("delivered");
                    info!(job_id = %result.job_id, "Webhook delivered");
                }
                Err(e) => {
                    metrics::record_webhook("failed");
                    warn!(job_id = %result.job_id, error = %e, "Webhook delivery failed, dropping");
                }
            }
        })
    }

    /// Make one delivery attempt.
    pub async fn deliver(&self, result: &JobResult) -> Result<(), NotifyError> {
        let url = result.webhook_url.as_deref().ok_or(NotifyError::MissingUrl)?;
        let url = parse_webhook_url(url)?;

        let mut payload = result.clone();
        payload.diagnostics = truncate_tail(&result.diagnostics, self.diagnostics_limit).to_string();
        let body = serde_json::to_vec(&payload)?;

        debug!(job_id = %result.job_id, "Sending webhook to {}", url);

        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = self.sign(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        Ok(())
    }

    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        Some(format!(
            "sha256={}",
            base64::engine::general_purpose::STANDARD.encode(digest)
        ))
    }
}

fn parse_webhook_url(raw: &str) -> Result<url::Url, NotifyError> {
    let url = url::Url::parse(raw).map_err(|_| NotifyError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(NotifyError::InvalidUrl(raw.to_string())),
    }
}

/// Keep at most `limit` trailing bytes, on a char boundary.
pub fn truncate_tail(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }

    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
