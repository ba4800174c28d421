//! What happens to a watched file after its batch: deletion on success,
//! a move to quarantine after repeated failures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::IngestError;

/// Delete a file whose batch has been committed.
pub async fn remove_processed(path: &Path) -> Result<(), IngestError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|source| IngestError::Delete {
            path: path.to_path_buf(),
            source,
        })
}

/// Move a file into `quarantine_dir`, prefixing the name with a UTC
/// timestamp so repeated quarantines of the same name don't collide.
pub async fn quarantine(path: &Path, quarantine_dir: &Path) -> Result<PathBuf, IngestError> {
    let err = |source| IngestError::Quarantine {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(quarantine_dir).await.map_err(err)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed.csv".to_string());
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let target = quarantine_dir.join(format!("{stamp}-{name}"));

    tokio::fs::rename(path, &target).await.map_err(err)?;
    Ok(target)
}

/// Consecutive failed cycles per file name, kept across cycles.
#[derive(Debug, Default)]
pub struct FailureTracker {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failure for `name` and return the new streak.
    pub fn record_failure(&self, name: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let n = counts.entry(name.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub fn reset(&self, name: &str) {
        self.counts.lock().unwrap().remove(name);
    }

    pub fn failures(&self, name: &str) -> u32 {
        self.counts.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}
