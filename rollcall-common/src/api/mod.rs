//! Shared API types
//!
//! Framework-free; the HTTP adapter wraps these in its own responders.

pub mod types;

pub use types::{ErrorResponse, ResponseStatus, SuccessResponse};
