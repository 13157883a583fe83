//! Authoritative record store
//!
//! Holds the students and attendance tables in memory behind a single
//! read-write lock and persists every mutation to SQLite before the
//! in-memory table changes. Callers never touch the table directly: they
//! take a [`StoreReadGuard`] for consistent snapshots or a
//! [`StoreWriteGuard`] for the one-writer-at-a-time mutation path.
//!
//! Holding a write guard is also the proof the index synchronizer asks for
//! before propagating a mutation, so "mutate, persist, propagate" runs as
//! one critical section.

use rollcall_common::{AttendanceRecord, Student, StudentId, Subject};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::db;

/// Record store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Roll number already exists: {0}")]
    DuplicateRoll(String),

    #[error("Student ID already exists: {0}")]
    DuplicateId(StudentId),

    #[error("Student not found in attendance: {0}")]
    NotFound(StudentId),

    #[error("{0} cannot be attended directly")]
    NotAttendable(Subject),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] rollcall_common::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Persistence(err.into())
    }
}

/// In-memory copy of both tables
#[derive(Debug, Default, Clone)]
pub struct Table {
    students: BTreeMap<StudentId, Student>,
    attendance: BTreeMap<StudentId, AttendanceRecord>,
    rolls: HashMap<String, StudentId>,
}

impl Table {
    fn from_rows(students: Vec<Student>, attendance: Vec<AttendanceRecord>) -> Self {
        let mut table = Table::default();
        for student in students {
            table.rolls.insert(student.roll_number.clone(), student.id);
            table.students.insert(student.id, student);
        }
        for record in attendance {
            table.attendance.insert(record.student_id, record);
        }
        table
    }

    pub fn get_by_id(&self, id: StudentId) -> Option<&Student> {
        self.students.get(&id)
    }

    pub fn get_by_roll_number(&self, roll_number: &str) -> Option<&Student> {
        self.rolls
            .get(roll_number)
            .and_then(|id| self.students.get(id))
    }

    pub fn attendance(&self, id: StudentId) -> Option<&AttendanceRecord> {
        self.attendance.get(&id)
    }

    /// Snapshot of every attendance record, ordered by identifier
    pub fn list_all(&self) -> Vec<AttendanceRecord> {
        self.attendance.values().cloned().collect()
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> {
        self.students.values()
    }

    pub fn records(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.attendance.values()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    fn check_unique(&self, student: &Student) -> Result<(), StoreError> {
        if self.rolls.contains_key(&student.roll_number) {
            return Err(StoreError::DuplicateRoll(student.roll_number.clone()));
        }
        if self.students.contains_key(&student.id) || self.attendance.contains_key(&student.id) {
            return Err(StoreError::DuplicateId(student.id));
        }
        Ok(())
    }
}

/// Single source of truth for students and attendance counters
pub struct RecordStore {
    pool: SqlitePool,
    table: RwLock<Table>,
}

impl RecordStore {
    /// Load both tables from the database
    pub async fn open(pool: SqlitePool) -> Result<Self, StoreError> {
        let students = db::load_students(&pool).await?;
        let attendance = db::load_attendance(&pool).await?;

        let table = Table::from_rows(students, attendance);
        let orphans = table
            .students
            .keys()
            .filter(|id| !table.attendance.contains_key(id))
            .count();
        if orphans > 0 {
            warn!(orphans, "Students without an attendance row; they will not appear in listings");
        }
        info!(
            students = table.students.len(),
            attendance_rows = table.attendance.len(),
            "Record store loaded"
        );

        Ok(Self {
            pool,
            table: RwLock::new(table),
        })
    }

    /// Shared access for consistent reads
    pub async fn read(&self) -> StoreReadGuard<'_> {
        StoreReadGuard {
            table: self.table.read().await,
        }
    }

    /// Exclusive access for the mutation path
    pub async fn write(&self) -> StoreWriteGuard<'_> {
        StoreWriteGuard {
            pool: &self.pool,
            table: self.table.write().await,
        }
    }
}

/// Read access to a consistent table snapshot
pub struct StoreReadGuard<'a> {
    table: RwLockReadGuard<'a, Table>,
}

impl Deref for StoreReadGuard<'_> {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

/// Exclusive access; the only way to mutate the store
pub struct StoreWriteGuard<'a> {
    pool: &'a SqlitePool,
    table: RwLockWriteGuard<'a, Table>,
}

impl Deref for StoreWriteGuard<'_> {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.table
    }
}

impl StoreWriteGuard<'_> {
    /// Insert a new student with its attendance record
    ///
    /// Uniqueness of roll number and identifier is checked before anything
    /// is written. Both rows commit in one transaction; memory changes only
    /// after the commit.
    pub async fn insert(
        &mut self,
        student: Student,
        record: AttendanceRecord,
    ) -> Result<(), StoreError> {
        self.table.check_unique(&student)?;

        let mut tx = self.pool.begin().await?;
        db::insert_student(&mut *tx, &student, &record).await?;
        tx.commit().await?;

        debug!(student_id = %student.id, roll_number = %student.roll_number, "Student persisted");

        self.table
            .rolls
            .insert(student.roll_number.clone(), student.id);
        self.table.attendance.insert(record.student_id, record);
        self.table.students.insert(student.id, student);
        Ok(())
    }

    /// Count one attendance for `subject`, bumping the total alongside it
    ///
    /// Returns `(new subject count, new total)`.
    pub async fn increment_attendance(
        &mut self,
        id: StudentId,
        subject: Subject,
    ) -> Result<(u32, u32), StoreError> {
        if !subject.is_taught() {
            return Err(StoreError::NotAttendable(subject));
        }
        let mut updated = self
            .table
            .attendance
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        let counts = updated.mark_present(subject)?;

        let mut tx = self.pool.begin().await?;
        db::write_counters(&mut *tx, &updated).await?;
        tx.commit().await?;

        debug!(student_id = %id, subject = %subject, subject_count = counts.0, total = counts.1, "Attendance persisted");

        self.table.attendance.insert(id, updated);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::{Descriptor, DESCRIPTOR_LEN};

    async fn open_store(dir: &tempfile::TempDir) -> RecordStore {
        let pool = db::init_database(&dir.path().join("rollcall.db"))
            .await
            .unwrap();
        RecordStore::open(pool).await.unwrap()
    }

    fn student(id: i64, roll: &str, name: &str) -> (Student, AttendanceRecord) {
        let id = StudentId::new(id).unwrap();
        (
            Student {
                id,
                name: name.to_string(),
                roll_number: roll.to_string(),
                descriptor: Descriptor::new(vec![0.1; DESCRIPTOR_LEN]).unwrap(),
            },
            AttendanceRecord::enrolled(id, name),
        )
    }

    #[tokio::test]
    async fn test_insert_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let (s, r) = student(7, "R1", "Asha");
        store.write().await.insert(s.clone(), r).await.unwrap();

        let read = store.read().await;
        assert_eq!(read.get_by_id(s.id), Some(&s));
        assert_eq!(read.get_by_roll_number("R1").map(|s| s.id), Some(s.id));
        assert_eq!(read.list_all().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let (s, r) = student(7, "R1", "Asha");
        store.write().await.insert(s, r).await.unwrap();

        let (dup_roll, r) = student(8, "R1", "Bela");
        let err = store.write().await.insert(dup_roll, r).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRoll(ref roll) if roll == "R1"));

        let (dup_id, r) = student(7, "R2", "Chitra");
        let err = store.write().await.insert(dup_id, r).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id.get() == 7));

        let read = store.read().await;
        assert_eq!(read.len(), 1);
        assert!(read.get_by_roll_number("R2").is_none());
    }

    #[tokio::test]
    async fn test_increment_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = StudentId::new(7).unwrap();
        {
            let store = open_store(&dir).await;
            let (s, r) = student(7, "R1", "Asha");
            let mut guard = store.write().await;
            guard.insert(s, r).await.unwrap();
            assert_eq!(guard.increment_attendance(id, Subject::Maths).await.unwrap(), (1, 1));
            assert_eq!(guard.increment_attendance(id, Subject::English).await.unwrap(), (1, 2));
        }

        let store = open_store(&dir).await;
        let read = store.read().await;
        let record = read.attendance(id).unwrap();
        assert_eq!(record.maths, 1);
        assert_eq!(record.english, 1);
        assert_eq!(record.total_attendance, 2);
        assert_eq!(read.get_by_id(id).unwrap().descriptor.components().len(), DESCRIPTOR_LEN);
    }

    #[tokio::test]
    async fn test_increment_unknown_student() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let err = store
            .write()
            .await
            .increment_attendance(StudentId::new(99).unwrap(), Subject::Maths)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_total_attendance_not_attendable() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let (s, r) = student(7, "R1", "Asha");
        let mut guard = store.write().await;
        guard.insert(s, r).await.unwrap();

        let err = guard
            .increment_attendance(StudentId::new(7).unwrap(), Subject::TotalAttendance)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAttendable(Subject::TotalAttendance)));
        assert_eq!(guard.attendance(StudentId::new(7).unwrap()).unwrap().total_attendance, 0);
    }
}
