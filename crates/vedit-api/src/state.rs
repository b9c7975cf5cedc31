//! Application state.

use std::sync::Arc;

use tokio::sync::watch;

use vedit_queue::{EventPublisher, JobQueue};
use vedit_worker::{JobExecutor, JobHandler, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    /// Runs jobs submitted to the synchronous endpoint
    pub handler: Arc<dyn JobHandler>,
    /// Stream that queued jobs are published to
    pub publisher: Arc<dyn EventPublisher>,
    /// Flips to `true` on server shutdown; cancels synchronous jobs
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(
        config: ApiConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let worker_config = WorkerConfig::from_env();
        let executor = JobExecutor::from_config(&worker_config)?;

        let queue = JobQueue::from_env()?;
        queue.init().await?;

        Ok(Self::from_parts(config, Arc::new(executor), Arc::new(queue), shutdown))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        config: ApiConfig,
        handler: Arc<dyn JobHandler>,
        publisher: Arc<dyn EventPublisher>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            handler,
            publisher,
            shutdown,
        }
    }
}
