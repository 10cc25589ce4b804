//! Search command - query a folder's corpus

use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use drivelens_core::domain::newtypes::FolderId;
use drivelens_core::Config;

use crate::context;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Folder id (UUID) to search in
    pub folder_id: String,

    /// Search query (filename or free text)
    pub query: String,

    /// Maximum results to return (clamped to 50)
    #[arg(long, default_value_t = 10)]
    pub top_k: usize,
}

impl SearchCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let folder_id = FolderId::from_str(&self.folder_id)?;
        let service = context::build_service(config).await?;

        let response = service.search(&folder_id, &self.query, self.top_k).await?;

        emit(format, &response, |response| {
            println!(
                "{} results ({}, {} ms)",
                response.hits.len(),
                response.search_type.as_str(),
                response.elapsed_ms
            );
            for hit in &response.hits {
                println!("  {:.3}  {}", hit.similarity, hit.name);
                if let Some(caption) = &hit.caption {
                    println!("         {caption}");
                }
            }
        });
        Ok(())
    }
}
