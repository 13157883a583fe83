//! Row-level reads and writes for the `students` and `attendance` tables

use rollcall_common::{AttendanceRecord, Descriptor, Error, Result, Student, StudentId};
use sqlx::{SqliteConnection, SqlitePool};

type AttendanceRow = (i64, String, i64, i64, i64, i64, i64, i64);

fn counter(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{} holds out-of-range value {}", column, value)))
}

/// Load every enrolled student, ordered by identifier
pub async fn load_students(pool: &SqlitePool) -> Result<Vec<Student>> {
    let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
        "SELECT student_id, name, roll_number, descriptor FROM students ORDER BY student_id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, name, roll_number, descriptor)| {
            Ok(Student {
                id: StudentId::new(id)?,
                name,
                roll_number,
                descriptor: Descriptor::parse_delimited(&descriptor)?,
            })
        })
        .collect()
}

/// Load every attendance row, ordered by identifier
pub async fn load_attendance(pool: &SqlitePool) -> Result<Vec<AttendanceRecord>> {
    let rows: Vec<AttendanceRow> = sqlx::query_as(
        "SELECT student_id, name, maths, english, chemistry, physics, datastructure, total_attendance
         FROM attendance ORDER BY student_id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, name, maths, english, chemistry, physics, datastructure, total)| {
            Ok(AttendanceRecord {
                student_id: StudentId::new(id)?,
                name,
                maths: counter("maths", maths)?,
                english: counter("english", english)?,
                chemistry: counter("chemistry", chemistry)?,
                physics: counter("physics", physics)?,
                datastructure: counter("datastructure", datastructure)?,
                total_attendance: counter("total_attendance", total)?,
            })
        })
        .collect()
}

/// Insert a student row and its attendance row
///
/// Callers run this inside a transaction so both rows land together.
pub async fn insert_student(
    conn: &mut SqliteConnection,
    student: &Student,
    record: &AttendanceRecord,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO students (student_id, name, roll_number, descriptor) VALUES (?, ?, ?, ?)",
    )
    .bind(student.id.get())
    .bind(&student.name)
    .bind(&student.roll_number)
    .bind(student.descriptor.to_delimited())
    .execute(&mut *conn)
    .await?;

    write_attendance_row(conn, record).await
}

async fn write_attendance_row(conn: &mut SqliteConnection, record: &AttendanceRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO attendance
            (student_id, name, maths, english, chemistry, physics, datastructure, total_attendance)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.student_id.get())
    .bind(&record.name)
    .bind(i64::from(record.maths))
    .bind(i64::from(record.english))
    .bind(i64::from(record.chemistry))
    .bind(i64::from(record.physics))
    .bind(i64::from(record.datastructure))
    .bind(i64::from(record.total_attendance))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Overwrite all six counters of one attendance row
pub async fn write_counters(conn: &mut SqliteConnection, record: &AttendanceRecord) -> Result<()> {
    let result = sqlx::query(
        "UPDATE attendance
         SET maths = ?, english = ?, chemistry = ?, physics = ?, datastructure = ?, total_attendance = ?
         WHERE student_id = ?",
    )
    .bind(i64::from(record.maths))
    .bind(i64::from(record.english))
    .bind(i64::from(record.chemistry))
    .bind(i64::from(record.physics))
    .bind(i64::from(record.datastructure))
    .bind(i64::from(record.total_attendance))
    .bind(record.student_id.get())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(Error::Internal(format!(
            "attendance row for student {} missing on update",
            record.student_id
        )));
    }
    Ok(())
}
