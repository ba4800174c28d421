//! Processed-file ledger.
//!
//! An append-only JSONL file of content hashes for files whose batch has
//! been committed. A file that is scanned again after a failed delete is
//! recognised by its hash and not inserted a second time.
//!
//! A hash is claimed before its batch is written, so two files with the same
//! content in one cycle cannot both be inserted.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sha256: String,
    pub file: String,
    pub rows: u64,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
    recorded: HashSet<String>,
    claimed: HashSet<String>,
}

#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

/// Result of [`ProcessedLedger::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// Nobody has this content; write it, then [`LedgerClaim::record`].
    Granted(LedgerClaim<'a>),
    /// Already committed.
    Recorded,
    /// Another file with this content holds the claim.
    InFlight,
}

/// Exclusive right to write one content hash. Dropping it without
/// recording releases the hash.
#[derive(Debug)]
pub struct LedgerClaim<'a> {
    ledger: &'a ProcessedLedger,
    sha256: String,
}

impl LedgerClaim<'_> {
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn record(&self, file: &str, rows: u64) -> Result<(), IngestError> {
        self.ledger.record(&LedgerEntry {
            sha256: self.sha256.clone(),
            file: file.to_string(),
            rows,
            ingested_at: Utc::now(),
        })
    }
}

impl Drop for LedgerClaim<'_> {
    fn drop(&mut self) {
        self.ledger.state.lock().unwrap().claimed.remove(&self.sha256);
    }
}

impl ProcessedLedger {
    /// Open (or create) the ledger at `path`, loading every recorded hash.
    /// Unparseable lines are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ledger_io(path, e))?;
        }

        let mut hashes = HashSet::new();
        match File::open(path) {
            Ok(file) => {
                for (idx, line) in BufReader::new(file).lines().enumerate() {
                    let line = line.map_err(|e| ledger_io(path, e))?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LedgerEntry>(&line) {
                        Ok(entry) => {
                            hashes.insert(entry.sha256);
                        }
                        Err(e) => warn!(
                            ledger = %path.display(),
                            line = idx + 1,
                            error = %e,
                            "skipping unreadable ledger line"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ledger_io(path, e)),
        }

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LedgerState {
                recorded: hashes,
                claimed: HashSet::new(),
            }),
        })
    }

    pub fn contains(&self, sha256: &str) -> bool {
        self.state.lock().unwrap().recorded.contains(sha256)
    }

    /// Check and claim `sha256` in one step.
    pub fn claim(&self, sha256: &str) -> Claim<'_> {
        let mut state = self.state.lock().unwrap();
        if state.recorded.contains(sha256) {
            Claim::Recorded
        } else if !state.claimed.insert(sha256.to_string()) {
            Claim::InFlight
        } else {
            Claim::Granted(LedgerClaim {
                ledger: self,
                sha256: sha256.to_string(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `entry` to disk, then remember its hash.
    pub fn record(&self, entry: &LedgerEntry) -> Result<(), IngestError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| IngestError::Ledger(format!("serialize entry: {e}")))?;

        let mut state = self.state.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ledger_io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| ledger_io(&self.path, e))?;
        state.recorded.insert(entry.sha256.clone());
        Ok(())
    }
}

fn ledger_io(path: &Path, e: io::Error) -> IngestError {
    IngestError::Ledger(format!("{}: {}", path.display(), e))
}

/// Hex SHA-256 of a file's bytes.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
