//! Domain model shared by every rollcall module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Number of components in a facial descriptor
pub const DESCRIPTOR_LEN: usize = 128;

// ========================================
// Identifiers
// ========================================

/// Externally assigned student identifier
///
/// Identifiers are non-negative; `-1` is reserved as the gallery's
/// "no match" sentinel on the external wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(i64);

impl StudentId {
    /// Create an identifier, rejecting negative values
    pub fn new(raw: i64) -> Result<Self> {
        if raw < 0 {
            return Err(Error::InvalidInput(format!(
                "student id must be non-negative, got {}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("student id must be an integer: {:?}", s)))?;
        Self::new(raw)
    }
}

// ========================================
// Subjects
// ========================================

/// Closed set of attendance subjects
///
/// `TotalAttendance` is synthetic: it is never attended directly, but it has
/// its own ordered index and can be threshold-queried like any subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Maths,
    English,
    Chemistry,
    Physics,
    Datastructure,
    TotalAttendance,
}

impl Subject {
    /// Every subject with an ordered index, in storage column order
    pub const ALL: [Subject; 6] = [
        Subject::Maths,
        Subject::English,
        Subject::Chemistry,
        Subject::Physics,
        Subject::Datastructure,
        Subject::TotalAttendance,
    ];

    /// Subjects a student can be marked present for
    pub const TAUGHT: [Subject; 5] = [
        Subject::Maths,
        Subject::English,
        Subject::Chemistry,
        Subject::Physics,
        Subject::Datastructure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Maths => "maths",
            Subject::English => "english",
            Subject::Chemistry => "chemistry",
            Subject::Physics => "physics",
            Subject::Datastructure => "datastructure",
            Subject::TotalAttendance => "total_attendance",
        }
    }

    pub fn is_taught(self) -> bool {
        self != Subject::TotalAttendance
    }

    /// Comma-separated list of recognised names, for error messages
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|subject| subject.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown subject {:?} (expected one of: {})",
                    s,
                    Self::names()
                ))
            })
    }
}

// ========================================
// Facial descriptors
// ========================================

/// Fixed-length facial descriptor produced by the feature extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Descriptor(Vec<f64>);

impl Descriptor {
    /// Validate length and finiteness of the raw components
    pub fn new(components: Vec<f64>) -> Result<Self> {
        if components.len() != DESCRIPTOR_LEN {
            return Err(Error::InvalidInput(format!(
                "descriptor must have {} components, got {}",
                DESCRIPTOR_LEN,
                components.len()
            )));
        }
        if let Some(pos) = components.iter().position(|c| !c.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "descriptor component {} is not a finite number",
                pos
            )));
        }
        Ok(Self(components))
    }

    pub fn components(&self) -> &[f64] {
        &self.0
    }

    /// Euclidean distance to another descriptor
    pub fn distance(&self, other: &Descriptor) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Component-wise mean of several pose descriptors
    ///
    /// Returns `None` when no poses were captured.
    pub fn mean(poses: &[Descriptor]) -> Option<Descriptor> {
        if poses.is_empty() {
            return None;
        }
        let count = poses.len() as f64;
        let mut sum = vec![0.0; DESCRIPTOR_LEN];
        for pose in poses {
            for (acc, value) in sum.iter_mut().zip(pose.0.iter()) {
                *acc += value;
            }
        }
        Some(Descriptor(sum.into_iter().map(|v| v / count).collect()))
    }

    /// Serialize as the comma-delimited string stored in the students table
    pub fn to_delimited(&self) -> String {
        self.0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a comma- or whitespace-delimited list of components
    ///
    /// Surrounding quotes are tolerated, since spreadsheet exports wrap the
    /// descriptor column in them.
    pub fn parse_delimited(text: &str) -> Result<Self> {
        let trimmed = text.trim().trim_matches('"');
        let components = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>().map_err(|_| {
                    Error::InvalidInput(format!("invalid descriptor component: {:?}", part))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(components)
    }
}

impl TryFrom<Vec<f64>> for Descriptor {
    type Error = Error;

    fn try_from(components: Vec<f64>) -> Result<Self> {
        Self::new(components)
    }
}

impl From<Descriptor> for Vec<f64> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.0
    }
}

// ========================================
// Records
// ========================================

/// Enrolled student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub roll_number: String,
    pub descriptor: Descriptor,
}

/// Per-subject attendance counters for one student
///
/// `total_attendance` is maintained incrementally alongside the subject
/// counters, never recomputed from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: StudentId,
    pub name: String,
    pub maths: u32,
    pub english: u32,
    pub chemistry: u32,
    pub physics: u32,
    pub datastructure: u32,
    pub total_attendance: u32,
}

impl AttendanceRecord {
    /// Fresh record with every counter at zero
    pub fn enrolled(student_id: StudentId, name: impl Into<String>) -> Self {
        Self {
            student_id,
            name: name.into(),
            maths: 0,
            english: 0,
            chemistry: 0,
            physics: 0,
            datastructure: 0,
            total_attendance: 0,
        }
    }

    pub fn get(&self, subject: Subject) -> u32 {
        match subject {
            Subject::Maths => self.maths,
            Subject::English => self.english,
            Subject::Chemistry => self.chemistry,
            Subject::Physics => self.physics,
            Subject::Datastructure => self.datastructure,
            Subject::TotalAttendance => self.total_attendance,
        }
    }

    fn get_mut(&mut self, subject: Subject) -> &mut u32 {
        match subject {
            Subject::Maths => &mut self.maths,
            Subject::English => &mut self.english,
            Subject::Chemistry => &mut self.chemistry,
            Subject::Physics => &mut self.physics,
            Subject::Datastructure => &mut self.datastructure,
            Subject::TotalAttendance => &mut self.total_attendance,
        }
    }

    /// Mark one attendance for a taught subject
    ///
    /// Bumps the subject counter and the total together and returns both
    /// new values as `(subject, total)`.
    pub fn mark_present(&mut self, subject: Subject) -> Result<(u32, u32)> {
        if !subject.is_taught() {
            return Err(Error::InvalidInput(format!(
                "{} cannot be attended directly",
                subject
            )));
        }
        let subject_count = self
            .get(subject)
            .checked_add(1)
            .ok_or_else(|| Error::Internal(format!("{} counter overflow", subject)))?;
        let total = self
            .total_attendance
            .checked_add(1)
            .ok_or_else(|| Error::Internal("total_attendance counter overflow".to_string()))?;
        *self.get_mut(subject) = subject_count;
        self.total_attendance = total;
        Ok((subject_count, total))
    }

    /// Sum of the taught-subject counters
    pub fn subject_sum(&self) -> u64 {
        Subject::TAUGHT
            .iter()
            .map(|s| u64::from(self.get(*s)))
            .sum()
    }
}
