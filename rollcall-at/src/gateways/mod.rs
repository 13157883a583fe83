//! Index gateways
//!
//! The three derived views of the record store sit behind narrow traits:
//! - [`OrderedIndexGateway`]: one ordered index per subject, keyed by
//!   attendance count, answering threshold queries
//! - [`PrefixIndexGateway`]: name index answering prefix search
//! - [`DescriptorGallery`]: facial descriptors answering identity resolution
//!
//! Every artifact is a cache rebuildable from the record store. Two
//! implementations exist: in-process structures ([`embedded`]) and the
//! external index executables ([`external`]).

pub mod embedded;
pub mod external;

use async_trait::async_trait;
use rollcall_common::config::{GatewayConfig, GatewayMode, RecognitionConfig};
use rollcall_common::{Descriptor, Student, StudentId, Subject};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use embedded::{EmbeddedGallery, EmbeddedOrderedIndex, EmbeddedPrefixIndex};
pub use external::{ExternalGallery, ExternalOrderedIndex, ExternalPrefixIndex, ExternalTools};

/// Failure of a single gateway operation
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from {program}: {output:?}")]
    Output { program: String, output: String },

    #[error("operation rejected: {0}")]
    Rejected(String),
}

// ========================================
// Shared value types
// ========================================

/// Direction of a threshold query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Values `>= threshold` (wire value `1`)
    AtLeast,
    /// Values `<= threshold` (wire value `-1`)
    AtMost,
}

impl Direction {
    pub fn as_arg(self) -> &'static str {
        match self {
            Direction::AtLeast => "1",
            Direction::AtMost => "-1",
        }
    }

    pub fn admits(self, value: u32, threshold: i64) -> bool {
        match self {
            Direction::AtLeast => i64::from(value) >= threshold,
            Direction::AtMost => i64::from(value) <= threshold,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" | "+1" => Ok(Direction::AtLeast),
            "-1" => Ok(Direction::AtMost),
            other => Err(format!("Direction must be either -1 or 1, got {:?}", other)),
        }
    }
}

impl TryFrom<i64> for Direction {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::AtLeast),
            -1 => Ok(Direction::AtMost),
            other => Err(format!("Direction must be either -1 or 1, got {}", other)),
        }
    }
}

/// Outcome of identity resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Match(StudentId),
    NoMatch,
}

/// Identifies one derived artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    Ordered(Subject),
    Prefix,
    Gallery,
}

impl Artifact {
    /// All eight artifacts derived from the record store
    pub fn all() -> Vec<Artifact> {
        let mut all: Vec<Artifact> = Subject::ALL.iter().map(|s| Artifact::Ordered(*s)).collect();
        all.push(Artifact::Prefix);
        all.push(Artifact::Gallery);
        all
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Ordered(subject) => write!(f, "ordered_index:{}", subject),
            Artifact::Prefix => f.write_str("prefix_index"),
            Artifact::Gallery => f.write_str("descriptor_gallery"),
        }
    }
}

impl Serialize for Artifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ========================================
// Gateway traits
// ========================================

/// Ordered-by-value index, one logical instance per subject
#[async_trait]
pub trait OrderedIndexGateway: Send + Sync {
    /// Rebuild the subject's index from scratch
    async fn build(&self, subject: Subject, entries: &[(StudentId, u32)]) -> Result<(), GatewayError>;

    /// Replace the value stored for `id`, inserting it if absent
    async fn update(&self, subject: Subject, id: StudentId, value: u32) -> Result<(), GatewayError>;

    /// Identifiers whose value satisfies `direction` against `threshold`
    ///
    /// Ordering is deterministic for a fixed index state.
    async fn threshold_query(
        &self,
        subject: Subject,
        threshold: i64,
        direction: Direction,
    ) -> Result<Vec<StudentId>, GatewayError>;
}

/// Name index supporting prefix search
#[async_trait]
pub trait PrefixIndexGateway: Send + Sync {
    /// Rebuild from every enrolled student
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError>;

    async fn insert(&self, name: &str, id: StudentId) -> Result<(), GatewayError>;

    /// Identifiers of every name starting with `query` (case-sensitive),
    /// in name order and then ascending id
    async fn search(&self, query: &str) -> Result<Vec<StudentId>, GatewayError>;
}

/// Nearest-neighbour gallery of enrolled descriptors
///
/// Implementations receive whole students because the external gallery
/// persists them as roster rows.
#[async_trait]
pub trait DescriptorGallery: Send + Sync {
    async fn build(&self, students: &[Student]) -> Result<(), GatewayError>;

    /// Add one enrolled student; replaying an identical entry succeeds
    async fn insert(&self, student: &Student) -> Result<(), GatewayError>;

    /// Closest enrolled identity, if it lies within the acceptance threshold
    async fn resolve(&self, probe: &Descriptor) -> Result<Resolution, GatewayError>;
}

/// The three gateways the synchronizer drives
#[derive(Clone)]
pub struct GatewaySet {
    pub ordered: Arc<dyn OrderedIndexGateway>,
    pub prefix: Arc<dyn PrefixIndexGateway>,
    pub gallery: Arc<dyn DescriptorGallery>,
}

impl GatewaySet {
    /// In-process gateways
    pub fn embedded(acceptance_threshold: f64) -> Self {
        Self {
            ordered: Arc::new(EmbeddedOrderedIndex::new()),
            prefix: Arc::new(EmbeddedPrefixIndex::new()),
            gallery: Arc::new(EmbeddedGallery::new(acceptance_threshold)),
        }
    }

    /// Gateways selected by configuration
    pub fn from_config(
        gateways: &GatewayConfig,
        recognition: &RecognitionConfig,
        root_folder: &Path,
        default_artifact_dir: &Path,
    ) -> Self {
        match gateways.mode {
            GatewayMode::Embedded => {
                info!(
                    acceptance_threshold = recognition.acceptance_threshold,
                    "Using embedded index gateways"
                );
                Self::embedded(recognition.acceptance_threshold)
            }
            GatewayMode::External => {
                let work_dir = gateways
                    .work_dir
                    .clone()
                    .unwrap_or_else(|| root_folder.to_path_buf());
                let bin_dir = gateways
                    .bin_dir
                    .clone()
                    .unwrap_or_else(|| Path::new("executable").to_path_buf());
                let artifact_dir = gateways
                    .artifact_dir
                    .clone()
                    .unwrap_or_else(|| default_artifact_dir.to_path_buf());
                info!(
                    work_dir = %work_dir.display(),
                    bin_dir = %bin_dir.display(),
                    artifact_dir = %artifact_dir.display(),
                    "Using external index executables"
                );
                let tools = Arc::new(ExternalTools::new(bin_dir, artifact_dir, work_dir));
                Self {
                    ordered: Arc::new(ExternalOrderedIndex::new(tools.clone())),
                    prefix: Arc::new(ExternalPrefixIndex::new(tools.clone())),
                    gallery: Arc::new(ExternalGallery::new(tools)),
                }
            }
        }
    }
}
