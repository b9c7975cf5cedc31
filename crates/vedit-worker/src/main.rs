//! Media job worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use vedit_queue::JobQueue;
use vedit_worker::{init_tracing, metrics, IntakeLoop, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing("vedit=info");

    info!("Starting vedit-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = metrics::init_exporter(port) {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(1);
        }
        info!("Metrics exporter listening on port {}", port);
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = queue.init().await {
        error!("Failed to initialize job queue: {}", e);
        std::process::exit(1);
    }

    let executor = match JobExecutor::from_config(&config) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to create job executor: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using FFmpeg at {}", executor.builder().ffmpeg_path().display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    IntakeLoop::new(Arc::new(queue), Arc::new(executor), &config)
        .run(shutdown_rx)
        .await;

    info!("Worker shutdown complete");
}
