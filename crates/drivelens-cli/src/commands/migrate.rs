//! Migrate command - run database and queue migrations
//!
//! Exits 0 even when the database is unreachable: deployments run this
//! before the daemon starts, and a transiently missing database must not
//! block the rollout (the daemon retries the same migrations on boot).

use anyhow::Result;
use clap::Args;
use drivelens_core::Config;
use drivelens_queue::QueuePool;
use drivelens_store::{DatabasePool, PgImageStore};
use drivelens_core::ports::store::ImageStore;
use tracing::warn;

use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct MigrateCommand {}

impl MigrateCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let mut report = serde_json::json!({
            "database": "skipped",
            "queue": "skipped",
            "vector": "skipped",
        });

        match DatabasePool::connect(&config.database.url).await {
            Ok(db) => {
                report["database"] = "migrated".into();
                let store = PgImageStore::new(&db, config.caption.embedding_dim);
                report["vector"] = match store.ensure_vector_infra().await {
                    Ok(()) => "provisioned".into(),
                    Err(err) => {
                        warn!(error = %err, "Vector infrastructure unavailable");
                        "unavailable".into()
                    }
                };
            }
            Err(err) => {
                warn!(error = %err, "Database migration skipped");
                report["database"] = "unreachable".into();
            }
        }

        match QueuePool::connect(&config.queue.url).await {
            Ok(_) => report["queue"] = "migrated".into(),
            Err(err) => {
                warn!(error = %err, "Queue migration skipped");
                report["queue"] = "unreachable".into();
            }
        }

        emit(format, &report, |report| {
            println!("database:  {}", report["database"].as_str().unwrap_or("?"));
            println!("queue:     {}", report["queue"].as_str().unwrap_or("?"));
            println!("vector:    {}", report["vector"].as_str().unwrap_or("?"));
        });
        Ok(())
    }
}
