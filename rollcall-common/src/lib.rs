//! # Rollcall Common Library
//!
//! Shared code for the rollcall services including:
//! - Domain model (students, subjects, facial descriptors, attendance records)
//! - Response envelope types for the service surface
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod api;
pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{AttendanceRecord, Descriptor, Student, StudentId, Subject, DESCRIPTOR_LEN};
