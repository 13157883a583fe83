//! Verification, listing and threshold endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use rollcall_common::api::SuccessResponse;
use rollcall_common::AttendanceRecord;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::services::{MarkedAttendance, VerifyOutcome};
use crate::AppState;

/// POST /verify request body
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub descriptor: Option<Vec<f64>>,
}

/// POST /verify
pub async fn verify(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse<MarkedAttendance>>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    match state
        .services
        .verification
        .verify(&body.subject, body.descriptor)
        .await?
    {
        VerifyOutcome::Marked(marked) => {
            let message = format!("Attendance marked for {}", marked.name);
            Ok(Json(SuccessResponse::new(marked).with_message(message)))
        }
        VerifyOutcome::NoMatch => Err(ApiError::NoMatch),
    }
}

/// GET /get_attendance
pub async fn get_attendance(
    State(state): State<AppState>,
) -> Json<SuccessResponse<Vec<AttendanceRecord>>> {
    Json(SuccessResponse::new(
        state.services.query.list_attendance().await,
    ))
}

/// POST /threshold_attendance request body
///
/// Threshold and direction arrive as strings or numbers and are validated
/// by the query service.
#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub threshold: Value,
    #[serde(default)]
    pub direction: Value,
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// POST /threshold_attendance
pub async fn threshold_attendance(
    State(state): State<AppState>,
    body: Result<Json<ThresholdRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse<Vec<AttendanceRecord>>>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let records = state
        .services
        .query
        .threshold_search(
            &body.subject,
            &field_text(&body.threshold),
            &field_text(&body.direction),
        )
        .await?;
    let message = format!("{} student(s) found", records.len());
    Ok(Json(SuccessResponse::new(records).with_message(message)))
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify))
        .route("/get_attendance", get(get_attendance))
        .route("/threshold_attendance", post(threshold_attendance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_text_accepts_strings_and_numbers() {
        assert_eq!(field_text(&Value::from("3")), "3");
        assert_eq!(field_text(&Value::from(-1)), "-1");
        assert_eq!(field_text(&Value::Null), "");
        assert_eq!(field_text(&Value::from(1.5)), "1.5");
    }
}
