//! Test Helper Utilities
//!
//! Shared harness for rollcall-at integration tests: a temporary root
//! folder, a real SQLite record store, embedded gateways wrapped for fault
//! injection, and a pre-recorded capture queue.

#![allow(dead_code)]

pub mod gateways;

pub use gateways::{FlakyOrdered, SlowPrefix};

use rollcall_at::capture::QueuedCapture;
use rollcall_at::db;
use rollcall_at::gateways::{EmbeddedGallery, GatewaySet};
use rollcall_at::services::{EnrollmentRequest, Services};
use rollcall_at::store::RecordStore;
use rollcall_at::sync::IndexSynchronizer;
use rollcall_common::{AttendanceRecord, Descriptor, Student, StudentId, DESCRIPTOR_LEN};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const ACCEPTANCE_THRESHOLD: f64 = 0.6;

/// Raw descriptor with `value` in the first component, zeros elsewhere
///
/// Two probes are `|a - b|` apart, which keeps distances easy to reason about.
pub fn probe(value: f64) -> Vec<f64> {
    let mut components = vec![0.0; DESCRIPTOR_LEN];
    components[0] = value;
    components
}

pub fn descriptor(value: f64) -> Descriptor {
    Descriptor::new(probe(value)).unwrap()
}

pub fn id(raw: i64) -> StudentId {
    StudentId::new(raw).unwrap()
}

pub fn enroll_request(student_id: i64, roll: &str, name: &str, at: f64) -> EnrollmentRequest {
    EnrollmentRequest {
        name: name.to_string(),
        roll_number: roll.to_string(),
        student_id: student_id.to_string(),
        descriptor: Some(probe(at)),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub services: Services,
    pub capture: Arc<QueuedCapture>,
    pub ordered: Arc<FlakyOrdered>,
    pub prefix: Arc<SlowPrefix>,
    pub gallery: Arc<EmbeddedGallery>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(2)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Self {
        Self::start(TempDir::new().unwrap(), timeout).await
    }

    /// Open (or reopen) the root folder and reconcile, as the binary does
    pub async fn start(dir: TempDir, timeout: Duration) -> Self {
        let pool = db::init_database(&dir.path().join("rollcall.db"))
            .await
            .unwrap();
        let store = Arc::new(RecordStore::open(pool).await.unwrap());

        let ordered = Arc::new(FlakyOrdered::new());
        let prefix = Arc::new(SlowPrefix::new());
        let gallery = Arc::new(EmbeddedGallery::new(ACCEPTANCE_THRESHOLD));
        let gateways = GatewaySet {
            ordered: ordered.clone(),
            prefix: prefix.clone(),
            gallery: gallery.clone(),
        };
        let sync = Arc::new(IndexSynchronizer::new(gateways, timeout));
        let capture = Arc::new(QueuedCapture::new());
        let services = Services::new(store, sync, capture.clone());

        let report = services.bootstrap().await;
        assert!(report.is_clean(), "bootstrap failed: {:?}", report.failures);

        Self {
            dir,
            services,
            capture,
            ordered,
            prefix,
            gallery,
        }
    }

    /// Drop every in-memory structure and start again from the database
    pub async fn restart(self) -> Self {
        let Harness { dir, .. } = self;
        Self::start(dir, Duration::from_secs(2)).await
    }

    pub async fn enroll(&self, student_id: i64, roll: &str, name: &str, at: f64) -> Student {
        self.services
            .enrollment
            .enroll(enroll_request(student_id, roll, name, at))
            .await
            .unwrap()
    }

    pub async fn record(&self, student_id: i64) -> AttendanceRecord {
        self.services
            .store()
            .read()
            .await
            .attendance(id(student_id))
            .cloned()
            .unwrap()
    }
}
