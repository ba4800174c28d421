use std::path::{Path, PathBuf};

use salesdash_core::SaleRecord;

/// The valid rows of one file, in file order, written in one store call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestBatch {
    source: PathBuf,
    records: Vec<SaleRecord>,
}

impl IngestBatch {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: SaleRecord) {
        self.records.push(record);
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
