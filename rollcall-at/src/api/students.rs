//! Enrollment and name search endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use rollcall_common::api::SuccessResponse;
use rollcall_common::{AttendanceRecord, StudentId};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::EnrollmentRequest;
use crate::AppState;

/// Identifier as sent by clients: JSON number or string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdField {
    Number(i64),
    Text(String),
}

impl IdField {
    fn into_text(self) -> String {
        match self {
            IdField::Number(n) => n.to_string(),
            IdField::Text(s) => s,
        }
    }
}

/// POST /add_student request body
#[derive(Debug, Deserialize)]
pub struct AddStudentRequest {
    pub name: String,
    /// Roll number
    pub rn: String,
    pub student_id: IdField,
    #[serde(default)]
    pub descriptor: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct EnrolledStudent {
    pub student_id: StudentId,
    pub name: String,
    pub roll_number: String,
}

/// POST /add_student
pub async fn add_student(
    State(state): State<AppState>,
    body: Result<Json<AddStudentRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse<EnrolledStudent>>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let student = state
        .services
        .enrollment
        .enroll(EnrollmentRequest {
            name: body.name,
            roll_number: body.rn,
            student_id: body.student_id.into_text(),
            descriptor: body.descriptor,
        })
        .await?;

    Ok(Json(
        SuccessResponse::new(EnrolledStudent {
            student_id: student.id,
            name: student.name,
            roll_number: student.roll_number,
        })
        .with_message("Student added successfully"),
    ))
}

/// POST /search_students request body
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
}

/// POST /search_students
///
/// An empty result is a success with an empty list.
pub async fn search_students(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SuccessResponse<Vec<AttendanceRecord>>>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let records = state.services.query.search_by_name(&body.query).await?;
    let message = format!("{} student(s) found", records.len());
    Ok(Json(SuccessResponse::new(records).with_message(message)))
}

pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/add_student", post(add_student))
        .route("/search_students", post(search_students))
}
