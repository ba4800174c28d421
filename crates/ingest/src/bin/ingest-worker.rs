//! ingest-worker: standalone CSV ingestion without the HTTP API.
//!
//! Runs the scheduler until Ctrl-C, or a single cycle with `--once`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;

use salesdash_core::config::{load_dotenv, Config};
use salesdash_ingest::{open_store, run_scheduler, Ingestor, TriggerKind};

// ── CLI ─────────────────────────────────────────────────────────────

/// CSV sales ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Directory to watch (overrides INGEST_WATCH_DIR).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Run one cycle, print its report as JSON and exit.
    #[arg(long)]
    once: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.dir {
        config.ingest.watch_dir = dir;
    }
    config.validate()?;
    config.log_summary();

    let store = open_store(&config).await?;
    let ingestor = Arc::new(Ingestor::from_config(&config, store)?);

    if cli.once {
        let report = ingestor
            .try_run_cycle(TriggerKind::Manual)
            .await
            .ok_or_else(|| anyhow::anyhow!("a cycle is already running"))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if let Some(err) = report.error {
            anyhow::bail!(err);
        }
        return Ok(());
    }

    let trigger = config.ingest.trigger()?;
    let shutdown = Arc::new(Notify::new());
    let scheduler = tokio::spawn(run_scheduler(ingestor, trigger, shutdown.clone()));

    info!("ingest-worker running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown.notify_one();
    scheduler.await?;

    info!("ingest-worker exited cleanly");
    Ok(())
}
