//! One ingestion cycle: scan the watched directory, then parse, write and
//! delete every file found.
//!
//! Files within a cycle are independent. Each one runs as its own task, so a
//! failure in one never affects another, and each valid batch becomes exactly
//! one call to [`SaleStore::insert_batch`]. A file is deleted only after its
//! batch has been committed.
//!
//! Only one cycle runs at a time per [`Ingestor`]. A trigger that arrives
//! while a cycle is in flight is skipped rather than queued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use salesdash_core::config::IngestConfig;
use salesdash_core::{Config, SaleSchema};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::IngestError;
use crate::job_log::append_cycle_log;
use crate::ledger::{content_hash, Claim, ProcessedLedger};
use crate::lifecycle::{quarantine, remove_processed, FailureTracker};
use crate::parser::{parse_file, DropReport, ParsedFile};
use crate::report::{CycleHistory, CycleReport, FileOutcome, FileReport, TriggerKind};
use crate::scanner::{scan_directory, WatchedFile};
use crate::store::SaleStore;

pub struct Ingestor {
    config: IngestConfig,
    store: Arc<dyn SaleStore>,
    ledger: Option<Arc<ProcessedLedger>>,
    failures: Arc<FailureTracker>,
    history: CycleHistory,
    cycle_log: Option<PathBuf>,
    running: AtomicBool,
}

impl Ingestor {
    /// An ingestor with no ledger and no cycle log.
    pub fn new(config: IngestConfig, store: Arc<dyn SaleStore>) -> Self {
        Self {
            config,
            store,
            ledger: None,
            failures: Arc::new(FailureTracker::new()),
            history: CycleHistory::new(),
            cycle_log: None,
            running: AtomicBool::new(false),
        }
    }

    /// Wire up the ledger and cycle log under `{data_dir}/ingestion`.
    pub fn from_config(config: &Config, store: Arc<dyn SaleStore>) -> Result<Self, IngestError> {
        let ingestion_dir = config.storage.ingestion_dir();
        let mut ingestor = Self::new(config.ingest.clone(), store)
            .with_cycle_log(ingestion_dir.join("cycles.jsonl"));
        if config.ingest.ledger_enabled {
            let ledger = ProcessedLedger::open(&ingestion_dir.join("ledger.jsonl"))?;
            info!(entries = ledger.len(), "processed-file ledger loaded");
            ingestor = ingestor.with_ledger(ledger);
        }
        Ok(ingestor)
    }

    pub fn with_ledger(mut self, ledger: ProcessedLedger) -> Self {
        self.ledger = Some(Arc::new(ledger));
        self
    }

    pub fn with_cycle_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.cycle_log = Some(path.into());
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SaleStore> {
        &self.store
    }

    pub fn history(&self) -> &CycleHistory {
        &self.history
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle unless another is already in flight, in which case
    /// the trigger is dropped and `None` is returned.
    pub async fn try_run_cycle(&self, trigger: TriggerKind) -> Option<CycleReport> {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            info!(trigger = ?trigger, "cycle already in progress; trigger skipped");
            return None;
        };

        let report = self.run_cycle(trigger).await;
        if let Some(log) = &self.cycle_log {
            append_cycle_log(log, &report);
        }
        self.history.push(report.clone());
        Some(report)
    }

    /// [`try_run_cycle`](Self::try_run_cycle) on its own task. Dropping the
    /// handle detaches the cycle instead of cancelling it.
    pub fn spawn_cycle(self: &Arc<Self>, trigger: TriggerKind) -> JoinHandle<Option<CycleReport>> {
        let ingestor = Arc::clone(self);
        tokio::spawn(async move { ingestor.try_run_cycle(trigger).await })
    }

    async fn run_cycle(&self, trigger: TriggerKind) -> CycleReport {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let watch_dir = self.config.watch_dir.clone();

        info!(cycle_id = %id, trigger = ?trigger, dir = %watch_dir.display(), "Checking for new CSV files...");

        let scanned = tokio::task::spawn_blocking(move || scan_directory(&watch_dir)).await;
        let (files, scan_error) = match scanned {
            Ok(Ok(files)) => (files, None),
            Ok(Err(e)) => {
                error!(cycle_id = %id, error = %e, "cycle aborted: watched directory unavailable");
                (Vec::new(), Some(e.to_string()))
            }
            Err(e) => {
                error!(cycle_id = %id, error = %e, "cycle aborted: directory scan task failed");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let files_found = files.len();
        let ctx = FileContext {
            store: self.store.clone(),
            table: self.config.table.clone(),
            schema: self.config.schema,
            ledger: self.ledger.clone(),
            failures: self.failures.clone(),
            max_failures: self.config.max_failures,
            quarantine_dir: self.config.quarantine_dir.clone(),
        };

        let mut tasks = JoinSet::new();
        for file in files {
            let ctx = ctx.clone();
            tasks.spawn(async move { ctx.process(file).await });
        }

        let mut reports = Vec::with_capacity(files_found);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(cycle_id = %id, error = %e, "file task panicked"),
            }
        }
        reports.sort_by(|a, b| a.file.cmp(&b.file));

        let rows_inserted: u64 = reports.iter().map(|r| r.outcome.inserted()).sum();
        let rows_dropped: u64 = reports.iter().map(|r| r.drops.dropped).sum();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            cycle_id = %id,
            files = files_found,
            rows_inserted,
            rows_dropped,
            retained = reports.iter().filter(|r| r.outcome.retained()).count(),
            duration_ms,
            "cycle finished"
        );

        CycleReport {
            id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            files_found,
            rows_inserted,
            rows_dropped,
            files: reports,
            error: scan_error,
        }
    }
}

// ── Single-flight guard ─────────────────────────────────────────────

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Per-file processing ─────────────────────────────────────────────

/// Everything a file task needs, cheap to clone into each task.
#[derive(Clone)]
struct FileContext {
    store: Arc<dyn SaleStore>,
    table: String,
    schema: SaleSchema,
    ledger: Option<Arc<ProcessedLedger>>,
    failures: Arc<FailureTracker>,
    max_failures: u32,
    quarantine_dir: PathBuf,
}

impl FileContext {
    async fn process(&self, file: WatchedFile) -> FileReport {
        let (sha256, parsed) = match self.read(&file).await {
            Ok(v) => v,
            Err(e) => {
                let outcome = self.fail(&file, e).await;
                return FileReport {
                    file: file.name,
                    rows_read: 0,
                    drops: DropReport::default(),
                    outcome,
                };
            }
        };

        let ParsedFile {
            batch,
            drops,
            rows_read,
        } = parsed;

        if !drops.is_empty() {
            warn!(
                file = %file.name,
                dropped = drops.dropped,
                kinds = ?drops.by_kind,
                "dropped invalid rows"
            );
        }

        let mut claim = None;
        if let (Some(ledger), Some(hash)) = (&self.ledger, &sha256) {
            let outcome = match ledger.claim(hash) {
                Claim::Granted(c) => {
                    claim = Some(c);
                    None
                }
                Claim::Recorded => Some(self.skip_recorded(&file, hash).await),
                Claim::InFlight => {
                    info!(file = %file.name, sha256 = %hash, "identical content is being written by another file; deferred");
                    Some(FileOutcome::Deferred {
                        sha256: hash.clone(),
                    })
                }
            };
            if let Some(outcome) = outcome {
                return FileReport {
                    file: file.name,
                    rows_read,
                    drops,
                    outcome,
                };
            }
        }

        let outcome = match self.store.insert_batch(&self.table, &batch).await {
            Ok(inserted) => {
                self.failures.reset(&file.name);
                info!(file = %file.name, rows = inserted, "Inserted {} records from {}", inserted, file.name);

                if let Some(claim) = &claim {
                    if let Err(e) = claim.record(&file.name, inserted) {
                        warn!(file = %file.name, error = %e, "failed to record file in ledger");
                    }
                }

                match remove_processed(&file.path).await {
                    Ok(()) => FileOutcome::Ingested { inserted },
                    Err(e) => {
                        error!(
                            file = %file.name,
                            error = %e,
                            "batch committed but file could not be deleted; it stays in the watched directory"
                        );
                        FileOutcome::DeleteFailed {
                            inserted,
                            error: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => self.fail(&file, IngestError::Write(e)).await,
        };

        FileReport {
            file: file.name,
            rows_read,
            drops,
            outcome,
        }
    }

    /// Delete a file whose content the ledger already holds.
    async fn skip_recorded(&self, file: &WatchedFile, hash: &str) -> FileOutcome {
        info!(file = %file.name, sha256 = %hash, "content already ingested; skipping insert");
        self.failures.reset(&file.name);
        match remove_processed(&file.path).await {
            Ok(()) => FileOutcome::AlreadyIngested {
                sha256: hash.to_string(),
            },
            Err(e) => {
                error!(file = %file.name, error = %e, "failed to delete already-ingested file");
                FileOutcome::DeleteFailed {
                    inserted: 0,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Hash (when the ledger is on) and parse the file on the blocking pool.
    async fn read(&self, file: &WatchedFile) -> Result<(Option<String>, ParsedFile), IngestError> {
        let path = file.path.clone();
        let schema = self.schema;
        let want_hash = self.ledger.is_some();

        let joined = tokio::task::spawn_blocking(move || {
            let sha256 = if want_hash {
                Some(content_hash(&path).map_err(|e| IngestError::Read {
                    path: path.clone(),
                    message: e.to_string(),
                })?)
            } else {
                None
            };
            let parsed = parse_file(&path, schema)?;
            Ok::<_, IngestError>((sha256, parsed))
        })
        .await;

        joined.unwrap_or_else(|e| {
            Err(IngestError::Read {
                path: file.path.clone(),
                message: e.to_string(),
            })
        })
    }

    /// Count the failure and quarantine the file once the streak reaches
    /// `max_failures`. The file is otherwise left for the next cycle.
    async fn fail(&self, file: &WatchedFile, err: IngestError) -> FileOutcome {
        let failures = self.failures.record_failure(&file.name);
        error!(file = %file.name, error = %err, failures, "file not ingested; retained for retry");

        if self.max_failures > 0 && failures >= self.max_failures {
            match quarantine(&file.path, &self.quarantine_dir).await {
                Ok(moved_to) => {
                    self.failures.reset(&file.name);
                    warn!(
                        file = %file.name,
                        moved_to = %moved_to.display(),
                        failures,
                        "file quarantined after repeated failures"
                    );
                    return FileOutcome::Quarantined {
                        moved_to,
                        error: err.to_string(),
                        failures,
                    };
                }
                Err(qe) => error!(file = %file.name, error = %qe, "quarantine failed"),
            }
        }

        let error = err.to_string();
        if matches!(err, IngestError::Write(_)) {
            FileOutcome::WriteFailed { error, failures }
        } else {
            FileOutcome::ReadFailed { error, failures }
        }
    }
}
