//! HTTP error mapping for rollcall-at
//!
//! Service errors keep their machine-readable kind; this module only picks
//! the status code and shapes the error envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rollcall_common::api::ErrorResponse;
use serde_json::{json, Value};
use thiserror::Error;

use crate::services::{EnrollError, QueryError, VerifyError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Verification found nobody; a defined outcome, not a failure (200)
    #[error("No enrolled student matched the captured face")]
    NoMatch,

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Enroll(e) => e.kind(),
            ApiError::Verify(e) => e.kind(),
            ApiError::Query(e) => e.kind(),
            ApiError::NoMatch => "NO_MATCH",
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Enroll(e) => match e {
                EnrollError::Validation(_) => StatusCode::BAD_REQUEST,
                EnrollError::DuplicateRoll(_) | EnrollError::DuplicateId(_) => StatusCode::CONFLICT,
                EnrollError::CaptureFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EnrollError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                EnrollError::PartialEnrollment { .. } => StatusCode::BAD_GATEWAY,
            },
            ApiError::Verify(e) => match e {
                VerifyError::InvalidSubject(_) | VerifyError::Validation(_) => StatusCode::BAD_REQUEST,
                VerifyError::CaptureFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                VerifyError::RecordNotFound(_) => StatusCode::NOT_FOUND,
                VerifyError::Gateway(_) | VerifyError::PartialUpdate { .. } => StatusCode::BAD_GATEWAY,
                VerifyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Query(e) => match e {
                QueryError::Validation(_)
                | QueryError::InvalidSubject(_)
                | QueryError::InvalidThreshold(_)
                | QueryError::InvalidDirection(_) => StatusCode::BAD_REQUEST,
                QueryError::Gateway(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::NoMatch => StatusCode::OK,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Extra context a repair pass needs
    fn details(&self) -> Option<Value> {
        match self {
            ApiError::Enroll(EnrollError::PartialEnrollment { student, failures }) => Some(json!({
                "student_id": student,
                "failures": failures,
            })),
            ApiError::Verify(VerifyError::PartialUpdate { marked, failures }) => Some(json!({
                "attendance": marked,
                "failures": failures,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.details() {
            Some(details) => ErrorResponse::with_details(self.kind(), self.to_string(), details),
            None => ErrorResponse::new(self.kind(), self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use rollcall_common::StudentId;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (QueryError::Validation("empty".into()).into(), StatusCode::BAD_REQUEST),
            (VerifyError::InvalidSubject("biology".into()).into(), StatusCode::BAD_REQUEST),
            (VerifyError::Validation("short".into()).into(), StatusCode::BAD_REQUEST),
            (QueryError::InvalidDirection("0".into()).into(), StatusCode::BAD_REQUEST),
            (EnrollError::DuplicateId(StudentId::new(7).unwrap()).into(), StatusCode::CONFLICT),
            (EnrollError::DuplicateRoll("R1".into()).into(), StatusCode::CONFLICT),
            (
                EnrollError::CaptureFailed(CaptureError::Unavailable).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                VerifyError::RecordNotFound(StudentId::new(7).unwrap()).into(),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::NoMatch, StatusCode::OK),
            (ApiError::BadRequest("bad json".into()), StatusCode::BAD_REQUEST),
            (
                EnrollError::PartialEnrollment {
                    student: StudentId::new(7).unwrap(),
                    failures: Vec::new(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error.kind());
        }
    }

    #[test]
    fn test_partial_enrollment_carries_details() {
        let error: ApiError = EnrollError::PartialEnrollment {
            student: StudentId::new(7).unwrap(),
            failures: Vec::new(),
        }
        .into();
        let details = error.details().unwrap();
        assert_eq!(details["student_id"], 7);
        assert!(details["failures"].as_array().unwrap().is_empty());
    }
}
