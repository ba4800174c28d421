//! Background loop that fires ingestion cycles on an interval or cron
//! schedule.
//!
//! The first cycle starts immediately. Each later tick spawns a cycle unless
//! one is still running, in which case the tick is skipped. Signalling
//! `shutdown` (with [`Notify::notify_one`]) stops new cycles; a cycle already
//! in flight is awaited before the loop returns.

use std::sync::Arc;

use chrono::Utc;
use salesdash_core::schedule::Trigger;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::cycle::Ingestor;
use crate::report::TriggerKind;

pub async fn run_scheduler(ingestor: Arc<Ingestor>, trigger: Trigger, shutdown: Arc<Notify>) {
    info!(trigger = %trigger, dir = %ingestor.config().watch_dir.display(), "ingestion scheduler started");

    let mut in_flight = Some(ingestor.spawn_cycle(TriggerKind::Startup));

    loop {
        let delay = trigger.delay_from(Utc::now());
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) || ingestor.is_running() {
            warn!("previous cycle still running; scheduled tick skipped");
            continue;
        }
        in_flight = Some(ingestor.spawn_cycle(TriggerKind::Scheduled));
    }

    info!("ingestion scheduler stopping");
    if let Some(handle) = in_flight {
        if !handle.is_finished() {
            info!("waiting for in-flight cycle to finish");
        }
        if let Err(e) = handle.await {
            warn!(error = %e, "in-flight cycle task failed");
        }
    }
    info!("ingestion scheduler stopped");
}

// ── Tests ────────────────────────────────────────────────────────────
