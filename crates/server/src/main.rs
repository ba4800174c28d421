mod api;
mod cli;
mod router;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use salesdash_core::Config;
use salesdash_ingest::{open_store, run_scheduler, Ingestor, TriggerKind};

use crate::state::AppState;

fn load_config() -> Config {
    salesdash_core::config::load_dotenv();
    Config::from_env()
}

async fn build_ingestor(config: &Config) -> anyhow::Result<Arc<Ingestor>> {
    config.validate()?;
    config.log_summary();
    let store = open_store(config).await?;
    Ok(Arc::new(Ingestor::from_config(config, store)?))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let ingestor = build_ingestor(&config).await?;

    let trigger = config.ingest.trigger()?;
    let shutdown = Arc::new(Notify::new());
    let scheduler = tokio::spawn(run_scheduler(ingestor.clone(), trigger, shutdown.clone()));

    let state = Arc::new(AppState::new(ingestor));
    let app = router::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on port {}", config.server.port);
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped; waiting for ingestion scheduler");
    shutdown.notify_one();
    scheduler.await?;
    Ok(())
}

async fn ingest_once(mut config: Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(dir) = dir {
        config.ingest.watch_dir = dir;
    }
    let ingestor = build_ingestor(&config).await?;

    let report = ingestor
        .try_run_cycle(TriggerKind::Manual)
        .await
        .ok_or_else(|| anyhow::anyhow!("a cycle is already running"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(err) = report.error {
        anyhow::bail!(err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    cli::dispatch(cli, config).await
}
