//! Cycle and per-file outcome types, plus the in-memory history of recent
//! cycles.

use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::DropReport;

/// How many finished cycles the history keeps.
pub const HISTORY_LIMIT: usize = 50;

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The immediate run at process start.
    Startup,
    /// Interval or cron tick.
    Scheduled,
    /// Requested via API or CLI.
    Manual,
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Batch committed and file deleted.
    Ingested { inserted: u64 },
    /// Content already committed by an earlier cycle; file deleted without
    /// a second insert.
    AlreadyIngested { sha256: String },
    /// Another file with the same content is being written this cycle;
    /// retained untouched and settled by the next cycle.
    Deferred { sha256: String },
    /// Batch committed (or already in the ledger) but the file is still
    /// there. It will be read again next cycle.
    DeleteFailed { inserted: u64, error: String },
    /// File could not be read; retained.
    ReadFailed { error: String, failures: u32 },
    /// Store rejected the batch; nothing committed, file retained.
    WriteFailed { error: String, failures: u32 },
    /// Failed too many cycles in a row; moved aside.
    Quarantined { moved_to: PathBuf, error: String, failures: u32 },
}

impl FileOutcome {
    pub fn inserted(&self) -> u64 {
        match self {
            Self::Ingested { inserted } | Self::DeleteFailed { inserted, .. } => *inserted,
            _ => 0,
        }
    }

    /// The file is still in the watched directory after the cycle.
    pub fn retained(&self) -> bool {
        matches!(
            self,
            Self::Deferred { .. }
                | Self::DeleteFailed { .. }
                | Self::ReadFailed { .. }
                | Self::WriteFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub rows_read: u64,
    pub drops: DropReport,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub id: Uuid,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub files_found: usize,
    pub rows_inserted: u64,
    pub rows_dropped: u64,
    pub files: Vec<FileReport>,
    /// Set when the watched directory could not be listed.
    pub error: Option<String>,
}

impl CycleReport {
    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.file == name)
    }
}

/// Recent cycle reports, oldest first, capped at [`HISTORY_LIMIT`].
#[derive(Debug, Default)]
pub struct CycleHistory {
    reports: RwLock<IndexMap<Uuid, CycleReport>>,
}

impl CycleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, report: CycleReport) {
        let mut reports = self.reports.write().unwrap();
        reports.insert(report.id, report);
        while reports.len() > HISTORY_LIMIT {
            reports.shift_remove_index(0);
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<CycleReport> {
        self.reports.read().unwrap().values().rev().cloned().collect()
    }

    pub fn last(&self) -> Option<CycleReport> {
        self.reports.read().unwrap().last().map(|(_, r)| r.clone())
    }
}
