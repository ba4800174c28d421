//! CLI argument parsing and subcommand dispatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use salesdash_core::Config;

#[derive(Parser, Debug)]
#[command(name = "salesdash-server", version, about = "Sales dashboard API and CSV ingestion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server and the ingestion scheduler (default).
    Serve,
    /// Run a single ingestion cycle, print its report as JSON and exit.
    IngestOnce {
        /// Directory to ingest (overrides INGEST_WATCH_DIR).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

pub async fn dispatch(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => crate::serve(config).await,
        Command::IngestOnce { dir } => crate::ingest_once(config, dir).await,
    }
}
