use std::sync::Arc;

use salesdash_ingest::{Ingestor, SaleStore};

/// Shared handler state. The store and target table come from the ingestor
/// so reads always see the table the cycles write to.
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }

    pub fn store(&self) -> &dyn SaleStore {
        self.ingestor.store().as_ref()
    }

    pub fn table(&self) -> &str {
        &self.ingestor.config().table
    }
}
