use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use salesdash_core::config::PostgresConfig;
use salesdash_core::record::round_cents;
use salesdash_core::{SaleRecord, SalesStats, StoredSale, NOT_AVAILABLE};

use super::{check_table, SaleStore, StoreError};
use crate::batch::IngestBatch;

/// Open a connection pool sized from config.
pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await?;
    info!("PostgreSQL connected: {}", config.host);
    Ok(pool)
}

/// Apply the bundled migrations (creates the `sales` table).
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Database migrations applied successfully");
    Ok(())
}

/// Row shape of the sales table.
#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    shop: String,
    product: String,
    category: String,
    quantity: i64,
    price: f64,
    benefits: f64,
    time_of_sale: DateTime<Utc>,
}

impl From<SaleRow> for StoredSale {
    fn from(row: SaleRow) -> Self {
        Self {
            id: row.id,
            record: SaleRecord {
                shop: row.shop,
                product: row.product,
                category: row.category,
                quantity: row.quantity,
                price: row.price,
                benefits: row.benefits,
                time_of_sale: row.time_of_sale,
            },
        }
    }
}

/// PostgreSQL-backed store. Each batch is one transaction, split into
/// multi-row INSERTs of at most `chunk_size` rows.
pub struct PgSaleStore {
    pool: PgPool,
    chunk_size: usize,
}

impl PgSaleStore {
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn top_by_quantity(&self, table: &str, column: &str) -> Result<String, StoreError> {
        let sql = format!(
            "SELECT {column} FROM {table} GROUP BY {column} \
             ORDER BY SUM(quantity) DESC, {column} ASC LIMIT 1"
        );
        let top: Option<(String,)> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        Ok(top.map(|(v,)| v).unwrap_or_else(|| NOT_AVAILABLE.to_string()))
    }
}

#[async_trait]
impl SaleStore for PgSaleStore {
    async fn insert_batch(&self, table: &str, batch: &IngestBatch) -> Result<u64, StoreError> {
        check_table(table)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in batch.records().chunks(self.chunk_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {table} (shop, product, category, quantity, price, benefits, time_of_sale) "
            ));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.shop.clone())
                    .push_bind(r.product.clone())
                    .push_bind(r.category.clone())
                    .push_bind(r.quantity)
                    .push_bind(r.price)
                    .push_bind(r.benefits)
                    .push_bind(r.time_of_sale);
            });
            let result = qb.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        // Dropping `tx` on an early `?` rolls the whole batch back.
        tx.commit().await?;
        debug!(table, rows = written, source = %batch.source().display(), "batch committed");
        Ok(written)
    }

    async fn list_newest_first(&self, table: &str) -> Result<Vec<StoredSale>, StoreError> {
        check_table(table)?;
        let sql = format!(
            "SELECT id, shop, product, category, quantity, price, benefits, time_of_sale \
             FROM {table} ORDER BY time_of_sale DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredSale::from).collect())
    }

    async fn stats(&self, table: &str) -> Result<SalesStats, StoreError> {
        check_table(table)?;
        let sql = format!(
            "SELECT COALESCE(SUM(quantity * price), 0)::float8, \
                    COALESCE(AVG(price), 0)::float8, \
                    COUNT(*) \
             FROM {table}"
        );
        let (total_revenue, average_price, total_sales): (f64, f64, i64) =
            sqlx::query_as(&sql).fetch_one(&self.pool).await?;

        if total_sales == 0 {
            return Ok(SalesStats::empty());
        }

        Ok(SalesStats {
            total_revenue,
            average_price: round_cents(average_price),
            top_category: self.top_by_quantity(table, "category").await?,
            top_shop: self.top_by_quantity(table, "shop").await?,
            total_sales,
        })
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
