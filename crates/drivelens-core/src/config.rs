//! Configuration module for DriveLens.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, defaults, env-var overrides for secrets, and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for DriveLens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub drive: DriveConfig,
    pub caption: CaptionConfig,
    pub limits: LimitsConfig,
    pub workers: WorkersConfig,
    pub logging: LoggingConfig,
}

/// Primary database settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    pub url: String,
}

/// Durable queue settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Postgres connection URL backing the job queue. May equal
    /// `database.url`; deployments can also point it at a dedicated
    /// instance.
    pub url: String,
}

/// Drive API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Service API key for public-folder access. Required unless every
    /// folder is accessed with a per-request user credential.
    pub service_key: Option<String>,
    /// Drive limiter: requests per minute.
    pub requests_per_minute: u32,
}

/// Captioning / embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// API key for the multimodal model service.
    pub api_key: Option<String>,
    /// Captioning model name.
    pub model: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Fixed embedding dimension for this deployment.
    pub embedding_dim: usize,
    /// Caption limiter: requests per minute.
    pub requests_per_minute: u32,
    /// Caption limiter: burst cap within the burst window.
    pub burst_max: u32,
    /// Caption limiter: burst window in milliseconds.
    pub burst_window_ms: u64,
}

/// Corpus limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-folder image cap; 0 means unlimited.
    pub max_images_per_folder: u32,
}

impl LimitsConfig {
    /// The cap as an Option, `None` meaning unlimited
    pub fn folder_cap(&self) -> Option<u32> {
        if self.max_images_per_folder == 0 {
            None
        } else {
            Some(self.max_images_per_folder)
        }
    }
}

/// Worker concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Concurrent image batch jobs per process. Choose so that
    /// `image_concurrency x per-image captioning latency` stays within
    /// the caption limiter.
    pub image_concurrency: usize,
    /// Concurrent folder jobs per process.
    pub folder_concurrency: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            service_key: None,
            requests_per_minute: 10_000,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dim: 768,
            requests_per_minute: 15,
            burst_max: 5,
            burst_window_ms: 1_000,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            image_concurrency: 5,
            folder_concurrency: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivelens/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivelens")
            .join("config.yaml")
    }

    /// Overlays secrets and connection URLs from the environment:
    /// `DRIVELENS_DATABASE_URL`, `DRIVELENS_QUEUE_URL`,
    /// `DRIVELENS_DRIVE_KEY`, `DRIVELENS_CAPTION_KEY`.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("DRIVELENS_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("DRIVELENS_QUEUE_URL") {
            self.queue.url = url;
        }
        if let Ok(key) = std::env::var("DRIVELENS_DRIVE_KEY") {
            self.drive.service_key = Some(key);
        }
        if let Ok(key) = std::env::var("DRIVELENS_CAPTION_KEY") {
            self.caption.api_key = Some(key);
        }
        self
    }

    /// Checks that every required setting is present.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("database.url is required");
        }
        if self.queue.url.is_empty() {
            anyhow::bail!("queue.url is required");
        }
        if self.caption.api_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("caption.api_key is required");
        }
        if self.caption.embedding_dim == 0 {
            anyhow::bail!("caption.embedding_dim must be positive");
        }
        if self.workers.image_concurrency == 0 || self.workers.folder_concurrency == 0 {
            anyhow::bail!("worker concurrency must be at least 1");
        }
        Ok(())
    }
}
