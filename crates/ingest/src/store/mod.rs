//! Batch writer seam: where validated rows end up.
//!
//! [`SaleStore`] is the only contract the ingestion cycle depends on. The
//! PostgreSQL store is the production backend; the in-memory store backs
//! development runs without a database and the tests.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use salesdash_core::config::is_plain_identifier;
use salesdash_core::{Config, SalesStats, StoredSale};

use crate::batch::IngestBatch;

pub use memory::MemorySaleStore;
pub use postgres::{connect_pool, run_migrations, PgSaleStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid table name '{0}'")]
    InvalidTable(String),
}

#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Write every record of `batch` into `table`, or none of them.
    ///
    /// One call per batch; returns the number of rows written. An empty
    /// batch is a successful no-op.
    async fn insert_batch(&self, table: &str, batch: &IngestBatch) -> Result<u64, StoreError>;

    /// All rows, newest `time_of_sale` first.
    async fn list_newest_first(&self, table: &str) -> Result<Vec<StoredSale>, StoreError>;

    /// Revenue, average price and top category/shop over `table`.
    async fn stats(&self, table: &str) -> Result<SalesStats, StoreError>;

    /// Short backend label for health output and logs.
    fn backend(&self) -> &'static str;
}

/// PostgreSQL when configured (migrations applied), otherwise the
/// in-memory store. A configured database that cannot be reached is an
/// error, never a silent fallback.
pub async fn open_store(config: &Config) -> Result<Arc<dyn SaleStore>, StoreError> {
    if !config.postgres.is_configured() {
        warn!("PG_URL not configured; sales are kept in memory and lost on exit");
        return Ok(Arc::new(MemorySaleStore::new()));
    }

    let pool = connect_pool(&config.postgres).await?;
    run_migrations(&pool).await?;
    info!(chunk_size = config.ingest.chunk_size, "using PostgreSQL sale store");
    Ok(Arc::new(PgSaleStore::new(pool, config.ingest.chunk_size)))
}

pub(crate) fn check_table(table: &str) -> Result<(), StoreError> {
    if is_plain_identifier(table) {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
