//! JSONL persistence of finished cycles.

use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::report::CycleReport;

/// Append a finished cycle's report to `log_path` as one JSON line.
///
/// Failures are logged and swallowed; the log never fails a cycle.
pub fn append_cycle_log(log_path: &Path, report: &CycleReport) {
    if let Some(dir) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(error = %e, "failed to create ingestion log directory");
            return;
        }
    }

    let json_line = match serde_json::to_string(report) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize cycle log entry");
            return;
        }
    };

    let mut file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, path = %log_path.display(), "failed to open cycle log");
            return;
        }
    };

    if let Err(e) = writeln!(file, "{}", json_line) {
        warn!(error = %e, "failed to write cycle log entry");
    }
}
