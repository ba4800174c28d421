use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use salesdash_core::{SalesStats, StoredSale};

use super::{check_table, SaleStore, StoreError};
use crate::batch::IngestBatch;

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemorySaleStore {
    tables: RwLock<HashMap<String, Vec<StoredSale>>>,
    next_id: AtomicI64,
}

impl MemorySaleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently held in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<StoredSale> {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SaleStore for MemorySaleStore {
    async fn insert_batch(&self, table: &str, batch: &IngestBatch) -> Result<u64, StoreError> {
        check_table(table)?;
        let mut tables = self.tables.write().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        for record in batch.records() {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            rows.push(StoredSale {
                id,
                record: record.clone(),
            });
        }
        Ok(batch.len() as u64)
    }

    async fn list_newest_first(&self, table: &str) -> Result<Vec<StoredSale>, StoreError> {
        check_table(table)?;
        let mut rows = self.rows(table);
        rows.sort_by(|a, b| {
            b.record
                .time_of_sale
                .cmp(&a.record.time_of_sale)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn stats(&self, table: &str) -> Result<SalesStats, StoreError> {
        check_table(table)?;
        let tables = self.tables.read().unwrap();
        Ok(match tables.get(table) {
            Some(rows) => SalesStats::from_records(rows.iter().map(|s| &s.record)),
            None => SalesStats::empty(),
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use salesdash_core::SaleRecord;
    use std::path::Path;

    fn record(product: &str, hour: u32) -> SaleRecord {
        SaleRecord {
            shop: "StoreA".to_string(),
            product: product.to_string(),
            category: "Tools".to_string(),
            quantity: 2,
            price: 5.0,
            benefits: 1.0,
            time_of_sale: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    fn batch(records: Vec<SaleRecord>) -> IngestBatch {
        let mut batch = IngestBatch::new(Path::new("x.csv"));
        for r in records {
            batch.push(r);
        }
        batch
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_keeps_file_order() {
        let store = MemorySaleStore::new();
        let written = store
            .insert_batch("sales", &batch(vec![record("a", 9), record("b", 8)]))
            .await
            .unwrap();
        assert_eq!(written, 2);

        let rows = store.rows("sales");
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(rows[0].record.product, "a");
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemorySaleStore::new();
        store
            .insert_batch("sales", &batch(vec![record("early", 8), record("late", 11), record("mid", 9)]))
            .await
            .unwrap();
        let products: Vec<String> = store
            .list_newest_first("sales")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.record.product)
            .collect();
        assert_eq!(products, vec!["late", "mid", "early"]);
    }

    #[tokio::test]
    async fn duplicate_batches_are_not_deduplicated() {
        let store = MemorySaleStore::new();
        let b = batch(vec![record("a", 9)]);
        store.insert_batch("sales", &b).await.unwrap();
        store.insert_batch("sales", &b).await.unwrap();
        assert_eq!(store.rows("sales").len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let store = MemorySaleStore::new();
        assert_eq!(store.insert_batch("sales", &batch(vec![])).await.unwrap(), 0);
        assert_eq!(store.stats("sales").await.unwrap(), SalesStats::empty());
    }

    #[tokio::test]
    async fn rejects_unsafe_table_name() {
        let store = MemorySaleStore::new();
        let err = store.insert_batch("sales;--", &batch(vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTable(_)));
    }

    #[tokio::test]
    async fn stats_over_stored_rows() {
        let store = MemorySaleStore::new();
        store
            .insert_batch("sales", &batch(vec![record("a", 9), record("b", 10)]))
            .await
            .unwrap();
        let stats = store.stats("sales").await.unwrap();
        assert_eq!(stats.total_revenue, 20.0);
        assert_eq!(stats.average_price, 5.0);
        assert_eq!(stats.top_category, "Tools");
        assert_eq!(stats.total_sales, 2);
    }
}
