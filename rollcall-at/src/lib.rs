//! rollcall-at library interface
//!
//! Attendance tracker: record store, derived index gateways, the
//! synchronizer keeping them consistent, and the HTTP adapter over the
//! service surface. Exposed as a library for integration testing.

pub mod api;
pub mod capture;
pub mod db;
pub mod error;
pub mod gateways;
pub mod services;
pub mod store;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Services;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Service startup time for uptime reporting
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::student_routes())
        .merge(api::attendance_routes())
        .merge(api::admin_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
