//! HTTP API handlers for rollcall-at
//!
//! Thin adapters: decode the JSON body, call one service operation, wrap
//! the outcome in the shared response envelope.

pub mod admin;
pub mod attendance;
pub mod health;
pub mod students;

pub use admin::admin_routes;
pub use attendance::attendance_routes;
pub use health::health_routes;
pub use students::student_routes;
