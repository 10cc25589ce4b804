//! DriveLens worker daemon
//!
//! The long-running process behind the pipeline: connects the adapters,
//! runs the claim loops for both queues, and keeps the recovery
//! supervisor sweeping. An HTTP front-end (out of scope here) talks to
//! the same database and queue; this process does the actual work.
//!
//! Shutdown: SIGINT/SIGTERM stop new claims, in-flight jobs finish, and
//! anything truly stuck is reclaimed by the next stall sweep after
//! restart.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drivelens_caption::{GeminiCaptioner, ModelClient};
use drivelens_core::Config;
use drivelens_drive::GoogleDriveProvider;
use drivelens_engine::{
    FolderProgressMap, FolderWorker, ImageWorker, RecoverySupervisor, WorkerRuntime,
};
use drivelens_limiter::{LimiterConfig, LimiterSet};
use drivelens_queue::{PgJobQueue, QueuePool};
use drivelens_store::{DatabasePool, PgImageStore};

#[derive(Debug, Parser)]
#[command(name = "drivelens-daemon", version, about = "DriveLens worker daemon")]
struct Args {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_or_default(path),
        None => Config::load_or_default(&Config::default_path()),
    }
    .apply_env();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    config.validate().context("invalid configuration")?;
    info!("DriveLens daemon starting");

    // Limiters are built once here and injected everywhere; they are the
    // process-wide quota accounting.
    let limiters = LimiterSet::new(
        LimiterConfig {
            max_per_window: config.caption.requests_per_minute,
            window: std::time::Duration::from_secs(60),
            burst_max: Some(config.caption.burst_max),
            burst_window: std::time::Duration::from_millis(config.caption.burst_window_ms),
        },
        LimiterConfig::per_minute(config.drive.requests_per_minute),
    );

    let db = DatabasePool::connect(&config.database.url)
        .await
        .context("connecting to database")?;
    let store: drivelens_engine::StoreRef =
        Arc::new(PgImageStore::new(&db, config.caption.embedding_dim));

    // Vector infrastructure is best-effort at boot: a missing extension
    // degrades search, it never blocks captioning.
    if let Err(err) = store.ensure_vector_infra().await {
        warn!(error = %err, "Vector backend unavailable at startup");
    }

    let queue_pool = QueuePool::connect(&config.queue.url)
        .await
        .context("connecting to queue")?;
    let queue: drivelens_engine::QueueRef = Arc::new(PgJobQueue::new(&queue_pool));

    let drive: drivelens_engine::DriveRef = Arc::new(GoogleDriveProvider::new(
        config.drive.service_key.clone(),
        limiters.drive.clone(),
    ));

    let api_key = config
        .caption
        .api_key
        .clone()
        .context("caption.api_key is required")?;
    let captioner: drivelens_engine::CaptionerRef = Arc::new(GeminiCaptioner::new(
        ModelClient::new(
            api_key,
            config.caption.model.clone(),
            config.caption.embedding_model.clone(),
        ),
        config.caption.embedding_dim,
    ));

    let progress = Arc::new(FolderProgressMap::new());
    let folder_worker = Arc::new(FolderWorker::new(
        store.clone(),
        queue.clone(),
        progress.clone(),
    ));
    let image_worker = Arc::new(ImageWorker::new(
        store.clone(),
        drive,
        captioner,
        limiters.caption.clone(),
        progress.clone(),
    ));

    let runtime = Arc::new(WorkerRuntime::new(
        queue.clone(),
        folder_worker,
        image_worker,
        config.workers.folder_concurrency,
        config.workers.image_concurrency,
    ));
    let recovery = Arc::new(RecoverySupervisor::new(store, queue, progress));

    let cancel = CancellationToken::new();

    let recovery_task = {
        let recovery = Arc::clone(&recovery);
        let cancel = cancel.clone();
        tokio::spawn(async move { recovery.run(cancel).await })
    };
    let runtime_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { runtime.run(cancel).await })
    };

    wait_for_shutdown().await;
    info!("Shutdown signal received; draining in-flight jobs");
    cancel.cancel();

    let _ = runtime_task.await;
    let _ = recovery_task.await;
    info!("DriveLens daemon stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
