//! DriveLens CLI - operator interface for the captioning pipeline
//!
//! Provides commands for:
//! - Submitting drive folders for ingestion
//! - Synchronizing a folder against the drive
//! - Searching a folder's corpus
//! - Retrying failed work
//! - Checking pipeline health
//! - Running database migrations

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::ingest::IngestCommand;
use commands::migrate::MigrateCommand;
use commands::retry::RetryCommand;
use commands::search::SearchCommand;
use commands::status::StatusCommand;
use commands::sync::SyncCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "drivelens", version, about = "Semantic search over drive image folders")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a drive folder URL for captioning
    Ingest(IngestCommand),
    /// Reconcile a folder against the drive
    Sync(SyncCommand),
    /// Search a folder's corpus
    Search(SearchCommand),
    /// Reset failed work to pending and re-queue it
    Retry(RetryCommand),
    /// Show pipeline health and queue statistics
    Status(StatusCommand),
    /// Run database and queue migrations
    Migrate(MigrateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config = context::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config, format).await,
        Commands::Sync(cmd) => cmd.execute(&config, format).await,
        Commands::Search(cmd) => cmd.execute(&config, format).await,
        Commands::Retry(cmd) => cmd.execute(&config, format).await,
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Migrate(cmd) => cmd.execute(&config, format).await,
    }
}
