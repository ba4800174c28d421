//! API endpoint modules.
//!
//! Shared error mapping lives here; handlers live in the sub-modules.

mod health;
mod ingestion;
mod sales;

#[cfg(test)]
mod tests;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use salesdash_ingest::StoreError;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Store failures surface as `500 {"error": "..."}`.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "store query failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Re-exports ───────────────────────────────────────────────────

pub use health::health;
pub use ingestion::{ingest_cycles, ingest_run};
pub use sales::{sales, stats};
