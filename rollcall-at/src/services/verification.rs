//! Biometric attendance verification
//!
//! Flow: validate the subject and any supplied descriptor, obtain a probe
//! descriptor (outside any lock), then under the store write lock resolve the identity, bump the
//! counters and propagate them to the subject and total indexes. Holding
//! the write lock from resolution to propagation linearizes concurrent
//! verifications of the same student.

use rollcall_common::{Descriptor, StudentId, Subject};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::capture::{CaptureError, DescriptorCapture};
use crate::gateways::{GatewayError, Resolution};
use crate::store::{RecordStore, StoreError};
use crate::sync::{ArtifactFailure, IndexSynchronizer};

/// Attendance counted for a resolved student
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedAttendance {
    pub student_id: StudentId,
    pub name: String,
    pub subject: Subject,
    pub subject_count: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Marked(MarkedAttendance),
    /// No enrolled descriptor lies within the acceptance threshold
    NoMatch,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid subject {0:?}: expected one of maths, english, chemistry, physics, datastructure")]
    InvalidSubject(String),

    #[error("{0}")]
    Validation(String),

    #[error("Descriptor capture failed: {0}")]
    CaptureFailed(#[from] CaptureError),

    #[error("Resolved student {0} has no attendance record")]
    RecordNotFound(StudentId),

    #[error("Identity resolution failed: {0}")]
    Gateway(GatewayError),

    #[error("Record store failure: {0}")]
    Store(StoreError),

    #[error("Attendance recorded for student {} but {} index(es) were not updated", .marked.student_id, .failures.len())]
    PartialUpdate {
        marked: MarkedAttendance,
        failures: Vec<ArtifactFailure>,
    },
}

impl VerifyError {
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::InvalidSubject(_) => "INVALID_SUBJECT",
            VerifyError::Validation(_) => "VALIDATION_ERROR",
            VerifyError::CaptureFailed(_) => "CAPTURE_FAILED",
            VerifyError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            VerifyError::Gateway(_) => "GATEWAY_FAILURE",
            VerifyError::Store(_) => "STORE_FAILURE",
            VerifyError::PartialUpdate { .. } => "PARTIAL_UPDATE",
        }
    }

    /// Rejected before any capture, gateway call or mutation
    pub fn is_validation(&self) -> bool {
        matches!(self, VerifyError::InvalidSubject(_) | VerifyError::Validation(_))
    }
}

/// Subjects a student can be marked present for
pub fn parse_attendable(subject: &str) -> Result<Subject, VerifyError> {
    subject
        .parse::<Subject>()
        .ok()
        .filter(|s| s.is_taught())
        .ok_or_else(|| VerifyError::InvalidSubject(subject.to_string()))
}

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<RecordStore>,
    sync: Arc<IndexSynchronizer>,
    capture: Arc<dyn DescriptorCapture>,
}

impl VerificationService {
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

    /// Resolve who is present and count one attendance for `subject`
    pub async fn verify(
        &self,
        subject: &str,
        probe: Option<Vec<f64>>,
    ) -> Result<VerifyOutcome, VerifyError> {
        let subject = parse_attendable(subject)?;
        let supplied = probe
            .map(Descriptor::new)
            .transpose()
            .map_err(|e| VerifyError::Validation(e.to_string()))?;

        let probe = match supplied {
            Some(descriptor) => descriptor,
            None => self.capture.capture().await?,
        };

        let mut guard = self.store.write().await;

        let id = match self.sync.resolve(&probe).await.map_err(VerifyError::Gateway)? {
            Resolution::Match(id) => id,
            Resolution::NoMatch => {
                info!(subject = %subject, "No enrolled student matched the probe");
                return Ok(VerifyOutcome::NoMatch);
            }
        };

        let (subject_count, total) = match guard.increment_attendance(id, subject).await {
            Ok(counts) => counts,
            Err(StoreError::NotFound(id)) => {
                error!(student_id = %id, "Gallery resolved a student missing from the record store");
                return Err(VerifyError::RecordNotFound(id));
            }
            Err(e) => return Err(VerifyError::Store(e)),
        };
        let name = guard
            .attendance(id)
            .map(|r| r.name.clone())
            .unwrap_or_default();

        let failures = self
            .sync
            .propagate_attendance(&guard, id, subject, subject_count, total)
            .await;
        drop(guard);

        let marked = MarkedAttendance {
            student_id: id,
            name,
            subject,
            subject_count,
            total,
        };

        if !failures.is_empty() {
            error!(
                student_id = %id,
                subject = %subject,
                subject_count,
                total,
                failed = failures.len(),
                "Partial update: counters committed, indexes behind"
            );
            return Err(VerifyError::PartialUpdate { marked, failures });
        }

        info!(
            student_id = %id,
            subject = %subject,
            subject_count,
            total,
            "Attendance marked"
        );
        Ok(VerifyOutcome::Marked(marked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_taught_subjects_are_attendable() {
        for subject in Subject::TAUGHT {
            assert_eq!(parse_attendable(subject.as_str()).unwrap(), subject);
        }
        let err = parse_attendable("total_attendance").unwrap_err();
        assert_eq!(err.kind(), "INVALID_SUBJECT");
        assert!(err.is_validation());
        assert!(parse_attendable("biology").is_err());
        assert!(parse_attendable("").is_err());
    }
}
