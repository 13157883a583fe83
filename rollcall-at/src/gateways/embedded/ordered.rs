//! Ordered attendance index
//!
//! Per subject: value -> ids (sorted) plus id -> value, so an update is a
//! move between buckets and a threshold query is a range scan.

use async_trait::async_trait;
use rollcall_common::{StudentId, Subject};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::gateways::{Direction, GatewayError, OrderedIndexGateway};

#[derive(Debug, Default, Clone)]
struct SubjectIndex {
    by_value: BTreeMap<u32, BTreeSet<StudentId>>,
    by_id: HashMap<StudentId, u32>,
}

impl SubjectIndex {
    fn set(&mut self, id: StudentId, value: u32) {
        if let Some(previous) = self.by_id.insert(id, value) {
            if previous == value {
                return;
            }
            if let Some(bucket) = self.by_value.get_mut(&previous) {
                bucket.remove(&id);
                if bucket.is_empty() {
                    self.by_value.remove(&previous);
                }
            }
        }
        self.by_value.entry(value).or_default().insert(id);
    }

    /// Matching ids, highest value first, ties by ascending id
    fn query(&self, threshold: i64, direction: Direction) -> Vec<StudentId> {
        let buckets: Box<dyn Iterator<Item = (&u32, &BTreeSet<StudentId>)>> = match direction {
            Direction::AtLeast => {
                let low = threshold.clamp(0, i64::from(u32::MAX) + 1);
                if low > i64::from(u32::MAX) {
                    return Vec::new();
                }
                Box::new(self.by_value.range(low as u32..).rev())
            }
            Direction::AtMost => {
                if threshold < 0 {
                    return Vec::new();
                }
                let high = threshold.min(i64::from(u32::MAX)) as u32;
                Box::new(self.by_value.range(..=high).rev())
            }
        };
        buckets.flat_map(|(_, ids)| ids.iter().copied()).collect()
    }
}

/// In-process ordered index for every subject
#[derive(Debug, Default)]
pub struct EmbeddedOrderedIndex {
    subjects: RwLock<HashMap<Subject, SubjectIndex>>,
}

impl EmbeddedOrderedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for `id`, if indexed
    pub async fn value_of(&self, subject: Subject, id: StudentId) -> Option<u32> {
        self.subjects
            .read()
            .await
            .get(&subject)
            .and_then(|index| index.by_id.get(&id).copied())
    }
}

#[async_trait]
impl OrderedIndexGateway for EmbeddedOrderedIndex {
    async fn build(&self, subject: Subject, entries: &[(StudentId, u32)]) -> Result<(), GatewayError> {
        let mut index = SubjectIndex::default();
        for (id, value) in entries {
            index.set(*id, *value);
        }
        self.subjects.write().await.insert(subject, index);
        Ok(())
    }

    async fn update(&self, subject: Subject, id: StudentId, value: u32) -> Result<(), GatewayError> {
        self.subjects
            .write()
            .await
            .entry(subject)
            .or_default()
            .set(id, value);
        Ok(())
    }

    async fn threshold_query(
        &self,
        subject: Subject,
        threshold: i64,
        direction: Direction,
    ) -> Result<Vec<StudentId>, GatewayError> {
        Ok(self
            .subjects
            .read()
            .await
            .get(&subject)
            .map(|index| index.query(threshold, direction))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> StudentId {
        StudentId::new(raw).unwrap()
    }

    async fn seeded() -> EmbeddedOrderedIndex {
        let index = EmbeddedOrderedIndex::new();
        index
            .build(
                Subject::Maths,
                &[(id(1), 0), (id(2), 3), (id(3), 5), (id(4), 3)],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_threshold_at_least_orders_by_value_descending() {
        let index = seeded().await;
        let ids = index
            .threshold_query(Subject::Maths, 3, Direction::AtLeast)
            .await
            .unwrap();
        assert_eq!(ids, vec![id(3), id(2), id(4)]);
    }

    #[tokio::test]
    async fn test_threshold_at_most_includes_boundary() {
        let index = seeded().await;
        let ids = index
            .threshold_query(Subject::Maths, 3, Direction::AtMost)
            .await
            .unwrap();
        assert_eq!(ids, vec![id(2), id(4), id(1)]);
    }

    #[tokio::test]
    async fn test_threshold_out_of_range_values() {
        let index = seeded().await;
        let all = index
            .threshold_query(Subject::Maths, -10, Direction::AtLeast)
            .await
            .unwrap();
        assert_eq!(all.len(), 4);

        let none = index
            .threshold_query(Subject::Maths, -1, Direction::AtMost)
            .await
            .unwrap();
        assert!(none.is_empty());

        let none = index
            .threshold_query(Subject::Maths, i64::MAX, Direction::AtLeast)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_moves_entry_between_values() {
        let index = seeded().await;
        index.update(Subject::Maths, id(1), 6).await.unwrap();

        assert_eq!(index.value_of(Subject::Maths, id(1)).await, Some(6));
        let top = index
            .threshold_query(Subject::Maths, 6, Direction::AtLeast)
            .await
            .unwrap();
        assert_eq!(top, vec![id(1)]);
        let bottom = index
            .threshold_query(Subject::Maths, 0, Direction::AtMost)
            .await
            .unwrap();
        assert!(bottom.is_empty());
    }

    #[tokio::test]
    async fn test_update_inserts_absent_key_and_leaves_others() {
        let index = seeded().await;
        index.update(Subject::Maths, id(9), 0).await.unwrap();
        index.update(Subject::English, id(9), 2).await.unwrap();

        assert_eq!(index.value_of(Subject::Maths, id(9)).await, Some(0));
        assert_eq!(index.value_of(Subject::Maths, id(3)).await, Some(5));
        assert_eq!(index.value_of(Subject::English, id(9)).await, Some(2));
        assert_eq!(index.value_of(Subject::English, id(3)).await, None);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_state() {
        let index = seeded().await;
        index.build(Subject::Maths, &[(id(5), 1)]).await.unwrap();

        let ids = index
            .threshold_query(Subject::Maths, 0, Direction::AtLeast)
            .await
            .unwrap();
        assert_eq!(ids, vec![id(5)]);
    }

    #[tokio::test]
    async fn test_unbuilt_subject_answers_empty() {
        let index = EmbeddedOrderedIndex::new();
        let ids = index
            .threshold_query(Subject::Physics, 0, Direction::AtLeast)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
