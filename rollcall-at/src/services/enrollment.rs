//! Student enrollment

use rollcall_common::{AttendanceRecord, Descriptor, Student, StudentId};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::capture::{CaptureError, DescriptorCapture};
use crate::store::{RecordStore, StoreError};
use crate::sync::{ArtifactFailure, IndexSynchronizer};

/// Enrollment input as received from callers
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentRequest {
    pub name: String,
    pub roll_number: String,
    /// Raw identifier text; must parse as a non-negative integer
    pub student_id: String,
    /// Descriptor captured client-side; the capture device is used when absent
    #[serde(default)]
    pub descriptor: Option<Vec<f64>>,
}

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("{0}")]
    Validation(String),

    #[error("Roll number already exists: {0}")]
    DuplicateRoll(String),

    #[error("Student ID already exists: {0}")]
    DuplicateId(StudentId),

    #[error("Descriptor capture failed: {0}")]
    CaptureFailed(#[from] CaptureError),

    #[error("Record store failure: {0}")]
    Store(StoreError),

    #[error("Student {student} enrolled but {} artifact(s) were not updated", .failures.len())]
    PartialEnrollment {
        student: StudentId,
        failures: Vec<ArtifactFailure>,
    },
}

impl EnrollError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrollError::Validation(_) => "VALIDATION_ERROR",
            EnrollError::DuplicateRoll(_) => "DUPLICATE_ROLL",
            EnrollError::DuplicateId(_) => "DUPLICATE_ID",
            EnrollError::CaptureFailed(_) => "CAPTURE_FAILED",
            EnrollError::Store(_) => "STORE_FAILURE",
            EnrollError::PartialEnrollment { .. } => "PARTIAL_ENROLLMENT",
        }
    }
}

impl From<StoreError> for EnrollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateRoll(roll) => EnrollError::DuplicateRoll(roll),
            StoreError::DuplicateId(id) => EnrollError::DuplicateId(id),
            other => EnrollError::Store(other),
        }
    }
}

/// Validated enrollment fields, before capture
struct Candidate {
    id: StudentId,
    name: String,
    roll_number: String,
    descriptor: Option<Descriptor>,
}

fn validate(request: EnrollmentRequest) -> Result<Candidate, EnrollError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(EnrollError::Validation("name is required".to_string()));
    }
    let roll_number = request.roll_number.trim().to_string();
    if roll_number.is_empty() {
        return Err(EnrollError::Validation("roll number is required".to_string()));
    }
    let id: StudentId = request
        .student_id
        .parse()
        .map_err(|e: rollcall_common::Error| EnrollError::Validation(e.to_string()))?;
    let descriptor = request
        .descriptor
        .map(Descriptor::new)
        .transpose()
        .map_err(|e| EnrollError::Validation(e.to_string()))?;

    Ok(Candidate {
        id,
        name,
        roll_number,
        descriptor,
    })
}

#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<RecordStore>,
    sync: Arc<IndexSynchronizer>,
    capture: Arc<dyn DescriptorCapture>,
}

impl EnrollmentService {
    pub fn new(
        store: Arc<RecordStore>,
        sync: Arc<IndexSynchronizer>,
        capture: Arc<dyn DescriptorCapture>,
    ) -> Self {
        Self {
            store,
            sync,
            capture,
        }
    }

    /// Enroll a new student and index them everywhere
    ///
    /// Duplicates are checked before capture so nobody is asked to pose for
    /// an enrollment that cannot succeed; the insert re-checks under the
    /// write lock.
    pub async fn enroll(&self, request: EnrollmentRequest) -> Result<Student, EnrollError> {
        let candidate = validate(request)?;

        {
            let table = self.store.read().await;
            if table.get_by_roll_number(&candidate.roll_number).is_some() {
                return Err(EnrollError::DuplicateRoll(candidate.roll_number));
            }
            if table.get_by_id(candidate.id).is_some() || table.attendance(candidate.id).is_some() {
                return Err(EnrollError::DuplicateId(candidate.id));
            }
        }

        let descriptor = match candidate.descriptor {
            Some(descriptor) => descriptor,
            None => self.capture.capture().await?,
        };

        let student = Student {
            id: candidate.id,
            name: candidate.name,
            roll_number: candidate.roll_number,
            descriptor,
        };
        let record = AttendanceRecord::enrolled(student.id, student.name.clone());

        let mut guard = self.store.write().await;
        guard.insert(student.clone(), record).await?;
        let failures = self.sync.propagate_enrollment(&guard, &student).await;
        drop(guard);

        if !failures.is_empty() {
            error!(
                student_id = %student.id,
                failed = failures.len(),
                "Partial enrollment: record committed, artifacts behind"
            );
            return Err(EnrollError::PartialEnrollment {
                student: student.id,
                failures,
            });
        }

        info!(
            student_id = %student.id,
            roll_number = %student.roll_number,
            "Student enrolled"
        );
        Ok(student)
    }
}
