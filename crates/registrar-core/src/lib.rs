//! Registrar Core - Domain models, validation, and registration logic.
//!
//! This crate decides whether a requested set of course enrollments is
//! admissible, commits it through the storage traits, and runs the
//! per-course waitlist. Persistence lives in `registrar-db`.

pub mod catalog;
pub mod clock;
pub mod coordinator;
pub mod course;
pub mod error;
pub mod ids;
pub mod policy;
pub mod storage;
pub mod student;
pub mod timetable;
pub mod validation;

// Re-exports for convenience
pub use catalog::{CatalogManager, CourseUpdate};
pub use clock::{RequestClock, RequestStamp};
pub use coordinator::{CourseStatus, DropOutcome, RegistrationCoordinator, RegistrationOutcome};
pub use course::{Course, CoursePatch, TimeSlot};
pub use error::{CatalogError, PolicyError, RegistrationError, StorageError, ValidationError};
pub use ids::{CourseCode, StudentId};
pub use policy::RegistrationPolicy;
pub use storage::{
    Admission, CatalogStore, CourseCatalog, CourseRetirement, CourseRevision, EnrollmentLedger,
    RegistrationStore, ReleasedSeat, SeatRelease, StudentDirectory, StudentRemoval, WaitlistEntry,
    WaitlistQueue,
};
pub use student::Student;
pub use timetable::{Timetable, TimetableDay, TimetableEntry};
pub use validation::{RegistrationSnapshot, ValidationReport, Validator};

#[cfg(any(test, feature = "test-utils"))]
pub use storage::memory::{InMemoryCatalog, InMemoryRegistrationStore, InMemoryStudentDirectory};
