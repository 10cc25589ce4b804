//! CLI composition root
//!
//! Builds the pipeline service from configuration: limiters first, then
//! the adapters, then the engine components. Mirrors the daemon's wiring
//! minus the worker runtime.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use drivelens_caption::{GeminiCaptioner, ModelClient};
use drivelens_core::Config;
use drivelens_drive::GoogleDriveProvider;
use drivelens_engine::{
    IngestCoordinator, PipelineService, SearchEngine, SyncEngine,
};
use drivelens_limiter::{LimiterConfig, LimiterSet};
use drivelens_queue::{PgJobQueue, QueuePool};
use drivelens_store::{DatabasePool, PgImageStore};

/// Loads configuration from the given path (or the default location),
/// then overlays environment secrets.
pub fn load_config(path: Option<&str>) -> Config {
    let config = match path {
        Some(p) => Config::load_or_default(Path::new(p)),
        None => Config::load_or_default(&Config::default_path()),
    };
    config.apply_env()
}

/// Builds the limiter set from configuration
pub fn build_limiters(config: &Config) -> LimiterSet {
    LimiterSet::new(
        LimiterConfig {
            max_per_window: config.caption.requests_per_minute,
            window: std::time::Duration::from_secs(60),
            burst_max: Some(config.caption.burst_max),
            burst_window: std::time::Duration::from_millis(config.caption.burst_window_ms),
        },
        LimiterConfig::per_minute(config.drive.requests_per_minute),
    )
}

/// Connects adapters and assembles the service facade
pub async fn build_service(config: &Config) -> Result<PipelineService> {
    config.validate().context("invalid configuration")?;
    let limiters = build_limiters(config);

    let db = DatabasePool::connect(&config.database.url)
        .await
        .context("connecting to database")?;
    let store: drivelens_engine::StoreRef =
        Arc::new(PgImageStore::new(&db, config.caption.embedding_dim));

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

    let folder_cap = config.limits.folder_cap();
    let sync = Arc::new(SyncEngine::new(
        drive.clone(),
        store.clone(),
        queue.clone(),
        folder_cap,
    ));
    let ingest = IngestCoordinator::new(
        drive.clone(),
        store.clone(),
        queue.clone(),
        sync.clone(),
        folder_cap,
    );
    let search = SearchEngine::new(store.clone(), captioner, limiters.caption.clone());

    Ok(PipelineService::new(store, queue, drive, ingest, sync, search))
}
