//! Sync command - reconcile a folder against the drive

use std::str::FromStr;

use anyhow::Result;
use clap::Args;
use drivelens_core::domain::newtypes::FolderId;
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::Config;

use crate::context;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Folder id (UUID) to reconcile
    pub folder_id: String,

    /// OAuth bearer token for a private folder
    #[arg(long)]
    pub token: Option<String>,
}

impl SyncCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let folder_id = FolderId::from_str(&self.folder_id)?;
        let service = context::build_service(config).await?;
        let credential = self.token.as_ref().map(UserCredential::new);

        let outcome = service.sync_folder(&folder_id, credential.as_ref()).await?;

        emit(format, &outcome, |outcome| {
            println!("added:     {}", outcome.added);
            println!("removed:   {}", outcome.removed);
            println!("status:    {}", outcome.status);
            println!("progress:  {}/{}", outcome.processed, outcome.total);
        });
        Ok(())
    }
}
