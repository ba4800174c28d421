//! Ingestion control: recent cycle history and manual runs.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use salesdash_ingest::{CycleReport, TriggerKind};

use super::ErrorResponse;
use crate::state::AppState;

/// Recent cycle reports, newest first.
pub async fn ingest_cycles(State(state): State<Arc<AppState>>) -> Json<Vec<CycleReport>> {
    Json(state.ingestor.history().recent())
}

/// Run one cycle now and return its report, or `409` if one is in flight.
///
/// The cycle runs on its own task, so a client that disconnects mid-cycle
/// does not abort it.
pub async fn ingest_run(State(state): State<Arc<AppState>>) -> Response {
    match state.ingestor.spawn_cycle(TriggerKind::Manual).await {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "an ingestion cycle is already running".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "manual ingestion cycle task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("ingestion cycle failed: {e}"),
                }),
            )
                .into_response()
        }
    }
}
