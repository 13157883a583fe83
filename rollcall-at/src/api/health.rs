//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::gateways::Artifact;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while any artifact is stale
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub students: usize,
    /// Artifacts that missed an update since the last reconciliation
    pub stale_artifacts: Vec<Artifact>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stale_artifacts = state.services.synchronizer().stale_artifacts().await;
    let students = state.services.store().read().await.len();

    Json(HealthResponse {
        status: if stale_artifacts.is_empty() { "ok" } else { "degraded" }.to_string(),
        module: "rollcall-at".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.startup_time.elapsed().as_secs(),
        students,
        stale_artifacts,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
