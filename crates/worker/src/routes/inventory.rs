//! Stock ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use inventory::StockLevel;

use crate::AppState;
use crate::error::ApiError;

/// PUT /inventory — sets the quantity on hand for a SKU.
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Json(level): Json<StockLevel>,
) -> Result<StatusCode, ApiError> {
    tracing::info!(sku = %level.sku, quantity = level.quantity, "stock configured");
    state.store.set_stock(level).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /inventory — lists every SKU.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StockLevel>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

/// GET /inventory/{sku} — returns one SKU.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> Result<Json<StockLevel>, ApiError> {
    state
        .store
        .get_stock(&sku)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("SKU '{sku}' not found")))
}
