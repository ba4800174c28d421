use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;

use salesdash_core::config::IngestConfig;
use salesdash_core::{SaleRecord, SalesStats, StoredSale};
use salesdash_ingest::{
    IngestBatch, Ingestor, MemorySaleStore, SaleStore, StoreError, TriggerKind,
};

use crate::router::build_router;
use crate::state::AppState;

// ── Helpers ─────────────────────────────────────────────────────────

fn sale(shop: &str, category: &str, quantity: i64, price: f64, day: u32) -> SaleRecord {
    SaleRecord {
        shop: shop.to_string(),
        product: "Widget".to_string(),
        category: category.to_string(),
        quantity,
        price,
        benefits: 1.0,
        time_of_sale: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
    }
}

fn app_with(store: Arc<dyn SaleStore>, config: IngestConfig) -> (Router, Arc<Ingestor>) {
    let ingestor = Arc::new(Ingestor::new(config, store));
    let state = Arc::new(AppState::new(ingestor.clone()));
    (build_router(state, "*"), ingestor)
}

fn config_in(dir: &Path) -> IngestConfig {
    IngestConfig::for_dir(dir.join("uploads"), dir.join("data"))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

// ── Read endpoints ──────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_backend() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _) = app_with(Arc::new(MemorySaleStore::new()), config_in(tmp.path()));

    let (status, body) = send(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["ingest_running"], false);
}

#[tokio::test]
async fn test_stats_on_empty_table() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _) = app_with(Arc::new(MemorySaleStore::new()), config_in(tmp.path()));

    let (status, body) = send(app, "GET", "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRevenue"], 0.0);
    assert_eq!(body["averagePrice"], 0.0);
    assert_eq!(body["topCategory"], "N/A");
    assert_eq!(body["topShop"], "N/A");
    assert_eq!(body["totalSales"], 0);
}

#[tokio::test]
async fn test_sales_newest_first_and_stats() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemorySaleStore::new());
    let mut batch = IngestBatch::new(Path::new("seed.csv"));
    batch.push(sale("StoreA", "Tools", 2, 10.0, 1));
    batch.push(sale("StoreB", "Food", 5, 1.0, 3));
    batch.push(sale("StoreA", "Tools", 1, 4.0, 2));
    store.insert_batch("sales", &batch).await.unwrap();

    let (app, _) = app_with(store, config_in(tmp.path()));

    let (status, body) = send(app.clone(), "GET", "/sales").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["shop"], "StoreB");
    assert_eq!(rows[0]["time_of_sale"], "2024-01-03T12:00:00Z");
    assert_eq!(rows[2]["price"], 10.0);
    assert!(rows[0]["id"].is_i64());

    let (status, body) = send(app, "GET", "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRevenue"], 29.0);
    assert_eq!(body["averagePrice"], 5.0);
    assert_eq!(body["topShop"], "StoreB");
    assert_eq!(body["topCategory"], "Food");
    assert_eq!(body["totalSales"], 3);
}

#[tokio::test]
async fn test_store_error_maps_to_500() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.table = "sales; drop".to_string();
    let (app, _) = app_with(Arc::new(MemorySaleStore::new()), config);

    let (status, body) = send(app, "GET", "/sales").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("invalid table name"));
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let tmp = tempfile::tempdir().unwrap();
    let (app, _) = app_with(Arc::new(MemorySaleStore::new()), config_in(tmp.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/stats")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

// ── Ingestion endpoints ─────────────────────────────────────────────

#[tokio::test]
async fn test_manual_run_ingests_and_is_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    std::fs::create_dir_all(&config.watch_dir).unwrap();
    std::fs::write(
        config.watch_dir.join("sales1.csv"),
        "shop,product,category,quantity,price,benefits,time_of_sale\n\
         StoreA,Widget,Tools,5,9.99,2.50,2024-01-01T10:00:00Z\n",
    )
    .unwrap();
    let (app, _) = app_with(Arc::new(MemorySaleStore::new()), config);

    let (status, body) = send(app.clone(), "POST", "/ingest/run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trigger"], "manual");
    assert_eq!(body["rows_inserted"], 1);

    let (_, cycles) = send(app.clone(), "GET", "/ingest/cycles").await;
    assert_eq!(cycles.as_array().unwrap().len(), 1);
    assert_eq!(cycles[0]["id"], body["id"]);

    let (_, stats) = send(app, "GET", "/stats").await;
    assert_eq!(stats["totalSales"], 1);
}

/// Holds every insert until released.
struct GatedStore {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SaleStore for GatedStore {
    async fn insert_batch(&self, _table: &str, batch: &IngestBatch) -> Result<u64, StoreError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(batch.len() as u64)
    }

    async fn list_newest_first(&self, _table: &str) -> Result<Vec<StoredSale>, StoreError> {
        Ok(Vec::new())
    }

    async fn stats(&self, _table: &str) -> Result<SalesStats, StoreError> {
        Ok(SalesStats::empty())
    }

    fn backend(&self) -> &'static str {
        "gated"
    }
}

#[tokio::test]
async fn test_manual_run_conflicts_with_running_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    std::fs::create_dir_all(&config.watch_dir).unwrap();
    std::fs::write(
        config.watch_dir.join("slow.csv"),
        "shop,product,category,quantity,price,benefits,time_of_sale\n\
         StoreA,Widget,Tools,1,1.00,0.10,2024-01-01T10:00:00Z\n",
    )
    .unwrap();

    let store = Arc::new(GatedStore {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let (app, ingestor) = app_with(store.clone(), config);

    let first = tokio::spawn(send(app.clone(), "POST", "/ingest/run"));
    store.entered.notified().await;

    let (status, body) = send(app, "POST", "/ingest/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));
    assert!(ingestor.is_running());

    store.release.notify_one();
    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_manual_run_survives_client_disconnect() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    std::fs::create_dir_all(&config.watch_dir).unwrap();
    let csv = config.watch_dir.join("slow.csv");
    std::fs::write(
        &csv,
        "shop,product,category,quantity,price,benefits,time_of_sale\n\
         StoreA,Widget,Tools,1,1.00,0.10,2024-01-01T10:00:00Z\n",
    )
    .unwrap();

    let store = Arc::new(GatedStore {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let (app, ingestor) = app_with(store.clone(), config);

    let request = tokio::spawn(send(app, "POST", "/ingest/run"));
    store.entered.notified().await;
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    store.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while ingestor.is_running() || ingestor.history().last().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("detached cycle should finish");

    let report = ingestor.history().last().unwrap();
    assert_eq!(report.trigger, TriggerKind::Manual);
    assert_eq!(report.rows_inserted, 1);
    assert!(!csv.exists());
    assert!(!ingestor.is_running());
}
