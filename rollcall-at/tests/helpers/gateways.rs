//! Gateway wrappers for fault injection
//!
//! Both delegate to the embedded implementations unless told to misbehave.

use async_trait::async_trait;
use rollcall_at::gateways::{
    Direction, EmbeddedOrderedIndex, EmbeddedPrefixIndex, GatewayError, OrderedIndexGateway,
    PrefixIndexGateway,
};
use rollcall_common::{Student, StudentId, Subject};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// Ordered index that rejects builds and updates for chosen subjects
#[derive(Default)]
pub struct FlakyOrdered {
    inner: EmbeddedOrderedIndex,
    failing: Mutex<HashSet<Subject>>,
}

impl FlakyOrdered {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, subject: Subject) {
        self.failing.lock().unwrap().insert(subject);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub async fn value_of(&self, subject: Subject, id: StudentId) -> Option<u32> {
        self.inner.value_of(subject, id).await
    }

    fn check(&self, subject: Subject) -> Result<(), GatewayError> {
        if self.failing.lock().unwrap().contains(&subject) {
            return Err(GatewayError::Rejected(format!("{} index unavailable", subject)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderedIndexGateway for FlakyOrdered {
    async fn build(&self, subject: Subject, entries: &[(StudentId, u32)]) -> Result<(), GatewayError> {
        self.check(subject)?;
        self.inner.build(subject, entries).await
    }

    async fn update(&self, subject: Subject, id: StudentId, value: u32) -> Result<(), GatewayError> {
        self.check(subject)?;
        self.inner.update(subject, id, value).await
    }

    async fn threshold_query(
        &self,
        subject: Subject,
        threshold: i64,
        direction: Direction,
    ) -> Result<Vec<StudentId>, GatewayError> {
        self.inner.threshold_query(subject, threshold, direction).await
    }
}

/// Prefix index whose inserts can be made to stall
#[derive(Default)]
pub struct SlowPrefix {
    inner: EmbeddedPrefixIndex,
    insert_delay: Mutex<Option<Duration>>,
}

impl SlowPrefix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stall_inserts(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl PrefixIndexGateway for SlowPrefix {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError> {
        self.inner.build(students).await
    }

    async fn insert(&self, name: &str, id: StudentId) -> Result<(), GatewayError> {
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.insert(name, id).await
    }

    async fn search(&self, query: &str) -> Result<Vec<StudentId>, GatewayError> {
        self.inner.search(query).await
    }
}
