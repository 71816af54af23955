use chrono::Weekday;
use thiserror::Error;

use crate::ids::{CourseCode, StudentId};

/// Business rejection of a requested course set. Only the first failing
/// check is reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No courses selected")]
    EmptySelection,

    #[error("Course {0} selected more than once")]
    DuplicateSelection(CourseCode),

    #[error("Course {0} does not exist")]
    UnknownCourse(CourseCode),

    #[error("Cannot register for {course}: prerequisite {missing} not completed")]
    PrerequisiteMissing {
        course: CourseCode,
        missing: CourseCode,
    },

    #[error("Total credits {total} is outside allowed range [{min}, {max}]")]
    CreditsOutOfRange { total: u32, min: u32, max: u32 },

    #[error("Course {course} is not in the {program} plan")]
    NotInProgramPlan { course: CourseCode, program: String },

    #[error("Schedule conflict: {first} overlaps with {second} on {day}")]
    ScheduleConflict {
        first: CourseCode,
        second: CourseCode,
        day: Weekday,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness constraint of the store rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Student not found: {0}")]
    UnknownStudent(StudentId),

    #[error("Course not found: {0}")]
    UnknownCourse(CourseCode),

    #[error("Student {student} is already registered for {course}")]
    DuplicateRegistration {
        student: StudentId,
        course: CourseCode,
    },

    #[error("Student {student} is not registered for {course}")]
    NotRegistered {
        student: StudentId,
        course: CourseCode,
    },

    #[error("Student {student} is not on the waitlist for {course}")]
    NotWaitlisted {
        student: StudentId,
        course: CourseCode,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RegistrationError {
    /// True when the operation failed because of the store rather than a
    /// business rule.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, RegistrationError::Storage(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Course '{0}' already exists")]
    CourseExists(CourseCode),

    #[error("Course '{0}' does not exist")]
    CourseNotFound(CourseCode),

    #[error("Student '{0}' already exists")]
    StudentExists(StudentId),

    #[error("Student '{0}' does not exist")]
    StudentNotFound(StudentId),

    #[error("Prerequisite '{0}' does not exist")]
    PrerequisiteNotFound(CourseCode),

    #[error("Prerequisite '{prerequisite}' of '{course}' would create a cycle")]
    PrerequisiteCycle {
        course: CourseCode,
        prerequisite: CourseCode,
    },

    #[error("Invalid course: {0}")]
    InvalidCourse(String),

    #[error("Invalid student: {0}")]
    InvalidStudent(String),

    #[error("Invalid program plan: {0}")]
    InvalidPlan(String),

    #[error("Cannot delete course {0}: students are registered or waitlisted")]
    CourseInUse(CourseCode),

    #[error("Capacity {capacity} of {course} is below current enrollment {enrolled}")]
    CapacityBelowEnrollment {
        course: CourseCode,
        capacity: u32,
        enrolled: u32,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("Minimum credits {min} exceeds maximum credits {max}")]
    InvertedBounds { min: u32, max: u32 },

    #[error("Maximum credits must be positive")]
    ZeroMaximum,
}
