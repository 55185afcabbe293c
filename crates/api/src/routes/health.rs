//! Health check endpoint

use axum::{extract::State, Json};
use inference_service::HealthReport;
use std::sync::Arc;

use crate::AppState;

/// GET /health - labels, input size and architecture of the loaded bundle
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.service.health())
}
