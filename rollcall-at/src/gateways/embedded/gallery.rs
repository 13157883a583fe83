//! Descriptor gallery with nearest-neighbour resolution
//!
//! Resolution scans every enrolled descriptor, keeps the closest one, and
//! accepts it only if its distance is strictly below the acceptance
//! threshold. Equal distances resolve to the smaller identifier.

use async_trait::async_trait;
use rollcall_common::{Descriptor, Student, StudentId};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::gateways::{DescriptorGallery, GatewayError, Resolution};

#[derive(Debug)]
pub struct EmbeddedGallery {
    acceptance_threshold: f64,
    entries: RwLock<BTreeMap<StudentId, Descriptor>>,
}

impl EmbeddedGallery {
    pub fn new(acceptance_threshold: f64) -> Self {
        Self {
            acceptance_threshold,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.acceptance_threshold
    }

    pub async fn contains(&self, id: StudentId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Closest enrolled descriptor regardless of threshold
    pub async fn nearest(&self, probe: &Descriptor) -> Option<(StudentId, f64)> {
        let entries = self.entries.read().await;
        let mut best: Option<(StudentId, f64)> = None;
        for (id, descriptor) in entries.iter() {
            let distance = probe.distance(descriptor);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((*id, distance)),
            }
        }
        best
    }
}

#[async_trait]
impl DescriptorGallery for EmbeddedGallery {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError> {
        let rebuilt: BTreeMap<StudentId, Descriptor> = students
            .iter()
            .map(|s| (s.id, s.descriptor.clone()))
            .collect();
        *self.entries.write().await = rebuilt;
        Ok(())
    }

    async fn insert(&self, student: &Student) -> Result<(), GatewayError> {
        let mut entries = self.entries.write().await;
        match entries.get(&student.id) {
            Some(existing) if *existing == student.descriptor => Ok(()),
            Some(_) => Err(GatewayError::Rejected(format!(
                "gallery already holds a different descriptor for student {}",
                student.id
            ))),
            None => {
                entries.insert(student.id, student.descriptor.clone());
                Ok(())
            }
        }
    }

    async fn resolve(&self, probe: &Descriptor) -> Result<Resolution, GatewayError> {
        let Some((id, distance)) = self.nearest(probe).await else {
            debug!("Gallery empty, no match");
            return Ok(Resolution::NoMatch);
        };

        if distance < self.acceptance_threshold {
            debug!(student_id = %id, distance, "Descriptor resolved");
            Ok(Resolution::Match(id))
        } else {
            debug!(
                nearest = %id,
                distance,
                threshold = self.acceptance_threshold,
                "Nearest descriptor outside acceptance threshold"
            );
            Ok(Resolution::NoMatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::DESCRIPTOR_LEN;

    fn id(raw: i64) -> StudentId {
        StudentId::new(raw).unwrap()
    }

    /// Descriptor with `value` in the first component, zeros elsewhere
    fn point(value: f64) -> Descriptor {
        let mut components = vec![0.0; DESCRIPTOR_LEN];
        components[0] = value;
        Descriptor::new(components).unwrap()
    }

    fn enrolled(raw: i64, value: f64) -> Student {
        Student {
            id: id(raw),
            name: format!("student-{}", raw),
            roll_number: format!("R{}", raw),
            descriptor: point(value),
        }
    }

    async fn seeded() -> EmbeddedGallery {
        let gallery = EmbeddedGallery::new(0.6);
        gallery
            .build(&[enrolled(7, 0.0), enrolled(9, 2.0)])
            .await
            .unwrap();
        gallery
    }

    #[tokio::test]
    async fn test_resolves_nearest_within_threshold() {
        let gallery = seeded().await;
        assert_eq!(gallery.resolve(&point(0.1)).await.unwrap(), Resolution::Match(id(7)));
        assert_eq!(gallery.resolve(&point(1.9)).await.unwrap(), Resolution::Match(id(9)));
    }

    #[tokio::test]
    async fn test_rejects_when_nearest_is_too_far() {
        let gallery = seeded().await;
        // Nearest is id 7 at distance 0.9, still outside 0.6
        assert_eq!(gallery.nearest(&point(0.9)).await.map(|(id, _)| id), Some(id(7)));
        assert_eq!(gallery.resolve(&point(0.9)).await.unwrap(), Resolution::NoMatch);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let gallery = seeded().await;
        assert_eq!(gallery.resolve(&point(0.6)).await.unwrap(), Resolution::NoMatch);
        assert_eq!(gallery.resolve(&point(0.59)).await.unwrap(), Resolution::Match(id(7)));
    }

    #[tokio::test]
    async fn test_equal_distance_prefers_smaller_id() {
        let gallery = EmbeddedGallery::new(0.6);
        gallery
            .build(&[enrolled(4, 0.2), enrolled(2, -0.2)])
            .await
            .unwrap();
        assert_eq!(gallery.resolve(&point(0.0)).await.unwrap(), Resolution::Match(id(2)));
    }

    #[tokio::test]
    async fn test_empty_gallery_never_matches() {
        let gallery = EmbeddedGallery::new(0.6);
        assert_eq!(gallery.resolve(&point(0.0)).await.unwrap(), Resolution::NoMatch);
    }

    #[tokio::test]
    async fn test_insert_is_append_only() {
        let gallery = seeded().await;
        gallery.insert(&enrolled(11, 5.0)).await.unwrap();
        gallery.insert(&enrolled(11, 5.0)).await.unwrap();
        assert!(gallery.insert(&enrolled(11, 6.0)).await.is_err());
        assert_eq!(gallery.resolve(&point(5.1)).await.unwrap(), Resolution::Match(id(11)));
    }
}
