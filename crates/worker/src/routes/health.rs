//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub bus: &'static str,
    pub tenant: String,
}

/// GET /health — returns worker health and which bus it runs on.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        bus: state.bus_kind,
        tenant: state.tenant_id.clone(),
    })
}
