//! Service surface
//!
//! Enrollment, verification and queries compose the record store, the
//! capture source and the index synchronizer. Each operation returns a
//! closed error enum whose `kind()` is the machine-readable code handed to
//! callers.

pub mod enrollment;
pub mod query;
pub mod verification;

pub use enrollment::{EnrollError, EnrollmentRequest, EnrollmentService};
pub use query::{QueryError, QueryService, ThresholdQuery};
pub use verification::{MarkedAttendance, VerificationService, VerifyError, VerifyOutcome};

use std::sync::Arc;
use tracing::warn;

use crate::capture::DescriptorCapture;
use crate::store::RecordStore;
use crate::sync::{IndexSynchronizer, ReconcileReport};

/// Every service, sharing one store and one synchronizer
#[derive(Clone)]
pub struct Services {
    pub enrollment: EnrollmentService,
    pub verification: VerificationService,
    pub query: QueryService,
    store: Arc<RecordStore>,
    sync: Arc<IndexSynchronizer>,
}

impl Services {
    pub fn new(
        store: Arc<RecordStore>,
        sync: Arc<IndexSynchronizer>,
        capture: Arc<dyn DescriptorCapture>,
    ) -> Self {
        Self {
            enrollment: EnrollmentService::new(store.clone(), sync.clone(), capture.clone()),
            verification: VerificationService::new(store.clone(), sync.clone(), capture),
            query: QueryService::new(store.clone(), sync.clone()),
            store,
            sync,
        }
    }

    /// Build every artifact from the freshly loaded store
    pub async fn bootstrap(&self) -> ReconcileReport {
        let report = self.reconcile().await;
        if !report.is_clean() {
            warn!(
                failed = report.failures.len(),
                "Starting with stale artifacts; queries on them may be incomplete"
            );
        }
        report
    }

    /// Rebuild every derived artifact from the record store
    pub async fn reconcile(&self) -> ReconcileReport {
        let guard = self.store.write().await;
        self.sync.reconcile(&guard).await
    }

    pub fn synchronizer(&self) -> &IndexSynchronizer {
        &self.sync
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }
}
