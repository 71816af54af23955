use redb::TableDefinition;

use registrar_core::StorageError;

/// Catalog entries.
/// Key: course code
/// Value: serialized Course as bytes
pub const COURSES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("courses");

/// Student records.
/// Key: student id
/// Value: serialized Student as bytes
pub const STUDENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("students");

/// Program plans.
/// Key: (program, level)
/// Value: serialized list of course codes as bytes
pub const PROGRAM_PLANS_TABLE: TableDefinition<(&str, u32), &[u8]> =
    TableDefinition::new("program_plans");

/// Active registrations. The key is the uniqueness constraint.
/// Key: (course, student)
pub const REGISTRATIONS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("registrations");

/// Registrations indexed by student, kept in step with REGISTRATIONS_TABLE.
/// Key: (student, course)
pub const STUDENT_REGISTRATIONS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("student_registrations");

/// Enrolled count per course. Courses without registrations have no row.
pub const ENROLLED_COUNTS_TABLE: TableDefinition<&str, u32> =
    TableDefinition::new("enrolled_counts");

/// Waitlist entries in promotion order. Equal stamps fall back to arrival.
/// Key: (course, wall_ms, seq, arrival)
/// Value: student id
pub const WAITLIST_TABLE: TableDefinition<WaitlistKey, &str> = TableDefinition::new("waitlist");

/// Position of each waiting (course, student) pair in WAITLIST_TABLE.
/// Enforces one entry per pair.
/// Key: (course, student)
/// Value: (wall_ms, seq, arrival)
pub const WAITLIST_INDEX_TABLE: TableDefinition<(&str, &str), (u64, u32, u64)> =
    TableDefinition::new("waitlist_index");

/// Next arrival number per course. Never decreases.
pub const WAITLIST_SEQUENCE_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("waitlist_sequence");

pub type WaitlistKey = (&'static str, u64, u32, u64);

pub(crate) fn db_err(e: impl ToString) -> StorageError {
    StorageError::Database(e.to_string())
}
