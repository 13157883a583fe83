//! Response envelope types for the service surface
//!
//! Every operation answers with either a success envelope carrying data
//! (possibly an empty list) or an error envelope carrying a
//! machine-readable kind plus a human-readable message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope status discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Successful outcome
///
/// # Examples
///
/// ```
/// use rollcall_common::api::types::SuccessResponse;
///
/// let response = SuccessResponse::new(vec![7, 9]).with_message("2 students");
/// assert_eq!(response.data, vec![7, 9]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Failed or non-success outcome
///
/// # Examples
///
/// ```
/// use rollcall_common::api::types::ErrorResponse;
///
/// let error = ErrorResponse::new("DUPLICATE_ROLL", "Roll number already exists");
/// assert_eq!(error.kind, "DUPLICATE_ROLL");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: ResponseStatus,
    /// Machine-readable error kind
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            kind: kind.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(kind: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(kind, message)
        }
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let response = SuccessResponse::new(Vec::<u32>::new());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "success");
        assert!(json["data"].as_array().unwrap().is_empty());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_error_envelope_with_details() {
        let details = serde_json::json!({ "failed": ["prefix_index"] });
        let error = ErrorResponse::with_details("PARTIAL_ENROLLMENT", "indexes lag", details);
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "PARTIAL_ENROLLMENT");
        assert_eq!(json["details"]["failed"][0], "prefix_index");
    }

    #[test]
    fn test_error_envelope_round_trips_without_details() {
        let json = r#"{"status":"error","kind":"NO_MATCH","message":"No student found"}"#;
        let error: ErrorResponse = serde_json::from_str(json).unwrap();

        assert_eq!(error.status, ResponseStatus::Error);
        assert!(error.details.is_none());
    }
}
