//! Directory scanner: finds the `.csv` files waiting in the watched directory.

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::IngestError;

/// A `.csv` file discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    /// File name only; keys the failure tracker.
    pub name: String,
}

/// List the `.csv` files directly inside `dir`, sorted by name.
///
/// Subdirectories are not descended into. An error on the directory itself
/// aborts the scan; an error on a single entry only skips that entry.
pub fn scan_directory(dir: &Path) -> Result<Vec<WatchedFile>, IngestError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                return Err(IngestError::DirectoryAccess {
                    path: dir.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if is_csv_name(name) {
            files.push(WatchedFile {
                name: name.to_string(),
                path: entry.into_path(),
            });
        }
    }

    Ok(files)
}

/// Case-sensitive, like the producers that drop these files.
fn is_csv_name(name: &str) -> bool {
    name.len() > ".csv".len() && name.ends_with(".csv")
}
