//! `vidforge-worker` -- queue-driven video generation worker.
//!
//! Loads the model through the inference sidecar, advertises readiness
//! via a flag file, then claims command records from the queue
//! directory one at a time and writes result records back.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidforge_engine::http::HttpEngine;
use vidforge_queue::JobQueue;
use vidforge_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidforge_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();

    // A flag left by a previous run must not advertise readiness while
    // the model is still loading.
    if let Err(e) = std::fs::remove_file(&config.ready_flag) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %config.ready_flag.display(), error = %e, "could not remove stale ready flag");
        }
    }

    let queue = match JobQueue::open(&config.queue_dir) {
        Ok(queue) => queue,
        Err(e) => {
            tracing::error!(dir = %config.queue_dir.display(), error = %e, "cannot open queue directory");
            std::process::exit(1);
        }
    };

    let engine = match HttpEngine::connect(&config.engine_url, &config.engine_overrides).await {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(url = %config.engine_url, error = %e, "cannot load model");
            std::process::exit(1);
        }
    };
    tracing::info!(
        resident_bytes = engine.info().resident_bytes,
        "model loaded"
    );

    if let Err(e) = std::fs::write(&config.ready_flag, b"ready\n") {
        tracing::error!(path = %config.ready_flag.display(), error = %e, "cannot write ready flag");
        std::process::exit(1);
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested; finishing current job");
                shutdown.cancel();
            }
        });
    }

    let worker = Worker::new(
        queue,
        Arc::new(engine),
        config.pipeline_settings(),
        Duration::from_millis(config.poll_interval_ms),
    );
    worker.run(shutdown).await;

    if let Err(e) = std::fs::remove_file(&config.ready_flag) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %config.ready_flag.display(), error = %e, "could not remove ready flag");
        }
    }
}
