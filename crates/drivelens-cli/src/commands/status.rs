//! Status command - pipeline health and queue statistics

use anyhow::Result;
use clap::Args;
use drivelens_core::Config;

use crate::context;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let service = context::build_service(config).await?;
        let report = service.health().await;

        emit(format, &report, |report| {
            println!(
                "database:  {}",
                if report.database { "ok" } else { "unreachable" }
            );
            println!(
                "queue:     {}",
                if report.queue { "ok" } else { "unreachable" }
            );
            if let Some(stats) = &report.folder_jobs {
                println!(
                    "folders:   {} queued, {} active, {} completed, {} failed",
                    stats.queued, stats.active, stats.completed, stats.failed
                );
            }
            if let Some(stats) = &report.image_jobs {
                println!(
                    "images:    {} queued, {} active, {} completed, {} failed",
                    stats.queued, stats.active, stats.completed, stats.failed
                );
            }
        });

        if !report.healthy() {
            std::process::exit(1);
        }
        Ok(())
    }
}
