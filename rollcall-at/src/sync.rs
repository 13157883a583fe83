//! Index synchronizer
//!
//! Mirrors committed record store mutations into the derived artifacts and
//! rebuilds them on demand. Every propagating method takes the store's
//! write guard, so a mutation and its propagation form one critical
//! section and two mutations can never interleave their index updates.
//!
//! Failure policy: once the store has committed, every remaining step is
//! still attempted. Each failed step is logged, returned to the caller, and
//! the artifact is marked stale until the next successful reconciliation.
//! Nothing is retried here; replaying an update after a partial failure is
//! the reconciliation pass's job.

use rollcall_common::{Descriptor, Student, StudentId, Subject};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::gateways::{Artifact, Direction, GatewayError, GatewaySet, Resolution};
use crate::store::StoreWriteGuard;

/// One artifact that did not take a propagation step
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactFailure {
    pub artifact: Artifact,
    #[serde(serialize_with = "serialize_display")]
    pub error: GatewayError,
}

fn serialize_display<S: Serializer>(error: &GatewayError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Artifacts rebuilt successfully
    pub rebuilt: Vec<Artifact>,
    pub failures: Vec<ArtifactFailure>,
    /// Students covered by the snapshot
    pub students: usize,
    /// Records whose stored total differs from the sum of subject counters
    pub total_drift: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct IndexSynchronizer {
    gateways: GatewaySet,
    timeout: Duration,
    stale: Mutex<BTreeSet<Artifact>>,
}

impl IndexSynchronizer {
    pub fn new(gateways: GatewaySet, timeout: Duration) -> Self {
        Self {
            gateways,
            timeout,
            stale: Mutex::new(BTreeSet::new()),
        }
    }

    /// Artifacts that missed at least one update since the last rebuild
    pub async fn stale_artifacts(&self) -> Vec<Artifact> {
        self.stale.lock().await.iter().copied().collect()
    }

    async fn bounded<T, F>(&self, artifact: Artifact, operation: &str, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout {
                operation: format!("{} on {}", operation, artifact),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn record_failure(
        &self,
        failures: &mut Vec<ArtifactFailure>,
        artifact: Artifact,
        error: GatewayError,
    ) {
        self.stale.lock().await.insert(artifact);
        failures.push(ArtifactFailure { artifact, error });
    }

    // ========================================
    // Mutation propagation
    // ========================================

    /// Index a newly committed student
    ///
    /// Order: prefix index, gallery, then every ordered index at zero.
    pub async fn propagate_enrollment(
        &self,
        _guard: &StoreWriteGuard<'_>,
        student: &Student,
    ) -> Vec<ArtifactFailure> {
        let mut failures = Vec::new();

        let result = self
            .bounded(
                Artifact::Prefix,
                "insert",
                self.gateways.prefix.insert(&student.name, student.id),
            )
            .await;
        if let Err(e) = result {
            error!(
                student_id = %student.id,
                artifact = %Artifact::Prefix,
                name = %student.name,
                error = %e,
                "Prefix index missed enrollment"
            );
            self.record_failure(&mut failures, Artifact::Prefix, e).await;
        }

        let result = self
            .bounded(
                Artifact::Gallery,
                "insert",
                self.gateways.gallery.insert(student),
            )
            .await;
        if let Err(e) = result {
            error!(
                student_id = %student.id,
                artifact = %Artifact::Gallery,
                error = %e,
                "Gallery missed enrollment"
            );
            self.record_failure(&mut failures, Artifact::Gallery, e).await;
        }

        for subject in Subject::ALL {
            let artifact = Artifact::Ordered(subject);
            let result = self
                .bounded(
                    artifact,
                    "update",
                    self.gateways.ordered.update(subject, student.id, 0),
                )
                .await;
            if let Err(e) = result {
                error!(
                    student_id = %student.id,
                    artifact = %artifact,
                    expected = 0,
                    error = %e,
                    "Ordered index missed enrollment"
                );
                self.record_failure(&mut failures, artifact, e).await;
            }
        }

        if failures.is_empty() {
            debug!(student_id = %student.id, "Enrollment propagated to every artifact");
        }
        failures
    }

    /// Push new counter values into the subject and total indexes
    pub async fn propagate_attendance(
        &self,
        _guard: &StoreWriteGuard<'_>,
        id: StudentId,
        subject: Subject,
        subject_count: u32,
        total: u32,
    ) -> Vec<ArtifactFailure> {
        let mut failures = Vec::new();

        for (target, value) in [(subject, subject_count), (Subject::TotalAttendance, total)] {
            let artifact = Artifact::Ordered(target);
            let result = self
                .bounded(artifact, "update", self.gateways.ordered.update(target, id, value))
                .await;
            if let Err(e) = result {
                error!(
                    student_id = %id,
                    artifact = %artifact,
                    expected = value,
                    error = %e,
                    "Ordered index missed attendance update"
                );
                self.record_failure(&mut failures, artifact, e).await;
            }
        }

        failures
    }

    // ========================================
    // Queries
    // ========================================

    pub async fn resolve(&self, probe: &Descriptor) -> Result<Resolution, GatewayError> {
        self.bounded(Artifact::Gallery, "resolve", self.gateways.gallery.resolve(probe))
            .await
    }

    pub async fn search_names(&self, query: &str) -> Result<Vec<StudentId>, GatewayError> {
        self.bounded(Artifact::Prefix, "search", self.gateways.prefix.search(query))
            .await
    }

    pub async fn threshold_ids(
        &self,
        subject: Subject,
        threshold: i64,
        direction: Direction,
    ) -> Result<Vec<StudentId>, GatewayError> {
        self.bounded(
            Artifact::Ordered(subject),
            "threshold",
            self.gateways.ordered.threshold_query(subject, threshold, direction),
        )
        .await
    }

    // ========================================
    // Reconciliation
    // ========================================

    /// Rebuild every derived artifact from one store snapshot
    ///
    /// Runs under the write guard so no mutation lands between snapshot and
    /// rebuild. A rebuilt artifact leaves the stale set; a failed one joins it.
    pub async fn reconcile(&self, guard: &StoreWriteGuard<'_>) -> ReconcileReport {
        let mut report = ReconcileReport {
            students: guard.len(),
            ..Default::default()
        };

        for record in guard.records() {
            if u64::from(record.total_attendance) != record.subject_sum() {
                report.total_drift += 1;
                warn!(
                    student_id = %record.student_id,
                    total_attendance = record.total_attendance,
                    subject_sum = record.subject_sum(),
                    "Stored total differs from subject counters"
                );
            }
        }

        let students: Vec<Student> = guard.students().cloned().collect();
        for artifact in Artifact::all() {
            let result = match artifact {
                Artifact::Ordered(subject) => {
                    let entries: Vec<(StudentId, u32)> = guard
                        .records()
                        .map(|r| (r.student_id, r.get(subject)))
                        .collect();
                    self.bounded(artifact, "build", self.gateways.ordered.build(subject, &entries))
                        .await
                }
                Artifact::Prefix => {
                    self.bounded(artifact, "build", self.gateways.prefix.build(&students))
                        .await
                }
                Artifact::Gallery => {
                    self.bounded(artifact, "build", self.gateways.gallery.build(&students))
                        .await
                }
            };

            match result {
                Ok(()) => {
                    self.stale.lock().await.remove(&artifact);
                    report.rebuilt.push(artifact);
                }
                Err(e) => {
                    error!(artifact = %artifact, error = %e, "Artifact rebuild failed");
                    self.record_failure(&mut report.failures, artifact, e).await;
                }
            }
        }

        info!(
            students = report.students,
            rebuilt = report.rebuilt.len(),
            failed = report.failures.len(),
            total_drift = report.total_drift,
            "Reconciliation finished"
        );
        report
    }
}
