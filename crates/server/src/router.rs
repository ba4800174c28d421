//! HTTP router construction.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/sales", get(api::sales))
        .route("/stats", get(api::stats))
        .route("/ingest/cycles", get(api::ingest_cycles))
        .route("/ingest/run", post(api::ingest_run))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// `*` allows any origin; anything else is taken as the single allowed one.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS_ORIGIN; allowing any origin");
            CorsLayer::permissive()
        }
    }
}
