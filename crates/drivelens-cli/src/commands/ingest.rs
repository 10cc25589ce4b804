//! Ingest command - submit a drive folder for captioning

use anyhow::Result;
use clap::Args;
use drivelens_core::ports::drive::UserCredential;
use drivelens_core::Config;

use crate::context;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Shared drive folder URL
    pub folder_url: String,

    /// OAuth bearer token for a private folder
    #[arg(long)]
    pub token: Option<String>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let service = context::build_service(config).await?;
        let credential = self.token.as_ref().map(UserCredential::new);

        let folder = service
            .ingest(&self.folder_url, None, credential.as_ref())
            .await?;

        emit(format, &folder, |folder| {
            println!("folder:    {}", folder.id);
            if let Some(name) = &folder.name {
                println!("name:      {name}");
            }
            println!("status:    {}", folder.status);
            println!(
                "progress:  {}/{}",
                folder.processed_images, folder.total_images
            );
        });
        Ok(())
    }
}
