//! Dashboard read endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use salesdash_core::{SalesStats, StoredSale};

use super::ApiError;
use crate::state::AppState;

/// Every stored sale, newest `time_of_sale` first.
pub async fn sales(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StoredSale>>, ApiError> {
    let rows = state.store().list_newest_first(state.table()).await?;
    Ok(Json(rows))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<SalesStats>, ApiError> {
    let stats = state.store().stats(state.table()).await?;
    Ok(Json(stats))
}
