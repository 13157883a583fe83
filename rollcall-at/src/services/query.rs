//! Read-only queries
//!
//! Search and threshold results are joined against the record store under
//! a read lock held across the gateway call. Writers propagate under the
//! write lock, so the index answer and the joined records come from the
//! same state.

use rollcall_common::{AttendanceRecord, StudentId, Subject};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gateways::{Direction, GatewayError};
use crate::store::{RecordStore, Table};
use crate::sync::IndexSynchronizer;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid subject {0:?}")]
    InvalidSubject(String),

    #[error("Threshold must be an integer, got {0:?}")]
    InvalidThreshold(String),

    #[error("{0}")]
    InvalidDirection(String),

    #[error("Index query failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => "VALIDATION_ERROR",
            QueryError::InvalidSubject(_) => "INVALID_SUBJECT",
            QueryError::InvalidThreshold(_) => "INVALID_THRESHOLD",
            QueryError::InvalidDirection(_) => "INVALID_DIRECTION",
            QueryError::Gateway(_) => "GATEWAY_FAILURE",
        }
    }
}

/// Validated threshold query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdQuery {
    pub subject: Subject,
    pub threshold: i64,
    pub direction: Direction,
}

impl ThresholdQuery {
    pub fn new(subject: Subject, threshold: i64, direction: Direction) -> Self {
        Self {
            subject,
            threshold,
            direction,
        }
    }

    /// Parse raw text fields; subject first, then threshold, then direction
    pub fn parse(subject: &str, threshold: &str, direction: &str) -> Result<Self, QueryError> {
        let subject: Subject = subject
            .parse()
            .map_err(|_| QueryError::InvalidSubject(subject.to_string()))?;
        let threshold: i64 = threshold
            .trim()
            .parse()
            .map_err(|_| QueryError::InvalidThreshold(threshold.to_string()))?;
        let direction: Direction = direction.parse().map_err(QueryError::InvalidDirection)?;
        Ok(Self::new(subject, threshold, direction))
    }
}

/// Records for `ids` in index order, skipping ids the store does not know
fn join(table: &Table, ids: &[StudentId]) -> Vec<AttendanceRecord> {
    ids.iter()
        .filter_map(|id| {
            let record = table.attendance(*id).cloned();
            if record.is_none() {
                warn!(student_id = %id, "Index returned a student missing from the record store");
            }
            record
        })
        .collect()
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<RecordStore>,
    sync: Arc<IndexSynchronizer>,
}

impl QueryService {
    pub fn new(store: Arc<RecordStore>, sync: Arc<IndexSynchronizer>) -> Self {
        Self { store, sync }
    }

    /// Snapshot of every attendance record
    pub async fn list_attendance(&self) -> Vec<AttendanceRecord> {
        self.store.read().await.list_all()
    }

    /// Records of every student whose name starts with `query`
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<AttendanceRecord>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::Validation("search query is required".to_string()));
        }

        let table = self.store.read().await;
        let ids = self.sync.search_names(query).await?;
        debug!(query, matches = ids.len(), "Name search");
        Ok(join(&table, &ids))
    }

    /// Records whose counter for the subject satisfies the threshold
    pub async fn threshold_search(
        &self,
        subject: &str,
        threshold: &str,
        direction: &str,
    ) -> Result<Vec<AttendanceRecord>, QueryError> {
        let query = ThresholdQuery::parse(subject, threshold, direction)?;
        self.run_threshold(query).await
    }

    pub async fn run_threshold(&self, query: ThresholdQuery) -> Result<Vec<AttendanceRecord>, QueryError> {
        let table = self.store.read().await;
        let ids = self
            .sync
            .threshold_ids(query.subject, query.threshold, query.direction)
            .await?;
        debug!(
            subject = %query.subject,
            threshold = query.threshold,
            direction = query.direction.as_arg(),
            matches = ids.len(),
            "Threshold search"
        );
        Ok(join(&table, &ids))
    }
}
