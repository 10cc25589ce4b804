//! Retry command - reset failed work and re-queue it

use std::str::FromStr;

use anyhow::{bail, Result};
use clap::Args;
use drivelens_core::domain::newtypes::{FolderId, ImageId};
use drivelens_core::Config;
use drivelens_engine::RetryTarget;

use crate::context;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct RetryCommand {
    /// Retry one image by id
    #[arg(long, conflicts_with = "folder")]
    pub image: Option<String>,

    /// Retry every failed or pending image of a folder
    #[arg(long, conflicts_with = "image")]
    pub folder: Option<String>,
}

impl RetryCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let target = match (&self.image, &self.folder) {
            (Some(image), None) => RetryTarget::Image(ImageId::from_str(image)?),
            (None, Some(folder)) => RetryTarget::Folder(FolderId::from_str(folder)?),
            _ => bail!("pass exactly one of --image or --folder"),
        };

        let service = context::build_service(config).await?;
        let outcome = service.retry(target).await?;

        emit(format, &outcome, |outcome| {
            println!("queued:    {}", outcome.queued_count);
        });
        Ok(())
    }
}
