//! Database initialization
//!
//! Opens (or creates) the record store database and makes sure both
//! tables exist. Safe to run on every startup.

use rollcall_common::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open the database at `db_path`, creating file and schema if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets readers proceed while the single writer commits
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_students_table(&pool).await?;
    create_attendance_table(&pool).await?;

    Ok(pool)
}

async fn create_students_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            student_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            roll_number TEXT NOT NULL UNIQUE,
            descriptor TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_attendance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            student_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            maths INTEGER NOT NULL DEFAULT 0 CHECK (maths >= 0),
            english INTEGER NOT NULL DEFAULT 0 CHECK (english >= 0),
            chemistry INTEGER NOT NULL DEFAULT 0 CHECK (chemistry >= 0),
            physics INTEGER NOT NULL DEFAULT 0 CHECK (physics >= 0),
            datastructure INTEGER NOT NULL DEFAULT 0 CHECK (datastructure >= 0),
            total_attendance INTEGER NOT NULL DEFAULT 0 CHECK (total_attendance >= 0),
            FOREIGN KEY (student_id) REFERENCES students(student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
