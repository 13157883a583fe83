//! Name prefix index
//!
//! Names are matched byte-for-byte from the start, case-sensitive. Results
//! come back in name order, then ascending id for students sharing a name,
//! so incremental inserts and a rebuild from the store agree.

use async_trait::async_trait;
use rollcall_common::{Student, StudentId};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use tokio::sync::RwLock;

use crate::gateways::{GatewayError, PrefixIndexGateway};

#[derive(Debug, Default)]
pub struct EmbeddedPrefixIndex {
    names: RwLock<BTreeMap<String, BTreeSet<StudentId>>>,
}

impl EmbeddedPrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn add(names: &mut BTreeMap<String, BTreeSet<StudentId>>, name: &str, id: StudentId) {
    names.entry(name.to_string()).or_default().insert(id);
}

#[async_trait]
impl PrefixIndexGateway for EmbeddedPrefixIndex {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError> {
        let mut names = BTreeMap::new();
        for student in students {
            add(&mut names, &student.name, student.id);
        }
        *self.names.write().await = names;
        Ok(())
    }

    async fn insert(&self, name: &str, id: StudentId) -> Result<(), GatewayError> {
        if name.is_empty() {
            return Err(GatewayError::Rejected("cannot index an empty name".to_string()));
        }
        add(&mut *self.names.write().await, name, id);
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<StudentId>, GatewayError> {
        let names = self.names.read().await;
        let mut found = Vec::new();
        for (name, ids) in names.range::<str, _>((Bound::Included(query), Bound::Unbounded)) {
            if !name.starts_with(query) {
                break;
            }
            for id in ids {
                if !found.contains(id) {
                    found.push(*id);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::{Descriptor, DESCRIPTOR_LEN};

    fn id(raw: i64) -> StudentId {
        StudentId::new(raw).unwrap()
    }

    fn named(name: &str, raw: i64) -> Student {
        Student {
            id: id(raw),
            name: name.to_string(),
            roll_number: format!("R{}", raw),
            descriptor: Descriptor::new(vec![0.0; DESCRIPTOR_LEN]).unwrap(),
        }
    }

    async fn seeded() -> EmbeddedPrefixIndex {
        let index = EmbeddedPrefixIndex::new();
        index
            .build(&[
                named("Asha", 7),
                named("Ashok", 3),
                named("Bela", 5),
                named("asha", 9),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_prefix_match_in_name_order() {
        let index = seeded().await;
        assert_eq!(index.search("Ash").await.unwrap(), vec![id(7), id(3)]);
        assert_eq!(index.search("Asha").await.unwrap(), vec![id(7)]);
    }

    #[tokio::test]
    async fn test_search_is_case_sensitive() {
        let index = seeded().await;
        assert_eq!(index.search("ash").await.unwrap(), vec![id(9)]);
        assert!(index.search("ASH").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_substring_is_not_a_match() {
        let index = seeded().await;
        assert!(index.search("sha").await.unwrap().is_empty());
        assert!(index.search("zzz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_names_order_by_id() {
        let index = seeded().await;
        index.insert("Bela", id(8)).await.unwrap();
        index.insert("Bela", id(1)).await.unwrap();
        index.insert("Bela", id(1)).await.unwrap();
        assert_eq!(index.search("Be").await.unwrap(), vec![id(1), id(5), id(8)]);

        // A rebuild from the same students gives the same answer
        let rebuilt = EmbeddedPrefixIndex::new();
        rebuilt
            .build(&[named("Bela", 8), named("Bela", 5), named("Bela", 1)])
            .await
            .unwrap();
        assert_eq!(rebuilt.search("Be").await.unwrap(), vec![id(1), id(5), id(8)]);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let index = EmbeddedPrefixIndex::new();
        assert!(index.insert("", id(1)).await.is_err());
    }
}
