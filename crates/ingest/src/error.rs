use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Failures of a cycle (`DirectoryAccess`) or of one file (everything else).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot list watched directory {path}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("bulk write failed: {0}")]
    Write(#[from] StoreError),

    #[error("cannot delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot quarantine {path}: {source}")]
    Quarantine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger error: {0}")]
    Ledger(String),
}
