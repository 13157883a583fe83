//! Database access layer for the record store

mod init;
mod rows;

pub use init::init_database;
pub use rows::{insert_student, load_attendance, load_students, write_counters};
