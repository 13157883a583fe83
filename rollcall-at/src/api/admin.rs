//! Administrative endpoints

use axum::{extract::State, routing::post, Json, Router};
use rollcall_common::api::SuccessResponse;
use tracing::info;

use crate::sync::ReconcileReport;
use crate::AppState;

/// POST /admin/reconcile
///
/// Rebuilds every derived artifact from the record store. Failed rebuilds
/// are listed in the report and stay stale.
pub async fn reconcile(State(state): State<AppState>) -> Json<SuccessResponse<ReconcileReport>> {
    info!("Reconciliation requested");
    let report = state.services.reconcile().await;
    let message = if report.is_clean() {
        format!("Rebuilt {} artifacts", report.rebuilt.len())
    } else {
        format!(
            "Rebuilt {} artifacts, {} failed",
            report.rebuilt.len(),
            report.failures.len()
        )
    };
    Json(SuccessResponse::new(report).with_message(message))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/reconcile", post(reconcile))
}
