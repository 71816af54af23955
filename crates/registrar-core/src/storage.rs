use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::clock::RequestStamp;
use crate::course::Course;
use crate::error::StorageError;
use crate::ids::{CourseCode, StudentId};
use crate::student::Student;

/// A student waiting for a seat in a full course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub student: StudentId,
    pub course: CourseCode,
    pub stamp: RequestStamp,
}

/// What happened to one course of an admitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Registered(CourseCode),
    Waitlisted { course: CourseCode, position: usize },
}

/// Result of releasing a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatRelease {
    /// The student held no registration for the course; nothing changed.
    NotRegistered,
    /// The seat was freed and handed to the next waitlisted student, if any.
    Released { promoted: Option<StudentId> },
}

/// Result of replacing a course record through the registration store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseRevision {
    NotFound,
    /// The new capacity is below the current enrollment; nothing changed.
    BelowEnrollment { enrolled: u32 },
    /// The record was replaced and waitlisted students filled any open seats.
    Revised { promoted: Vec<StudentId> },
}

/// Result of deleting a course through the registration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseRetirement {
    NotFound,
    /// Someone is registered or waitlisted; nothing changed.
    InUse,
    Retired,
}

/// A seat given up by a removed student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleasedSeat {
    pub course: CourseCode,
    pub promoted: Option<StudentId>,
}

/// Everything undone when a student record is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentRemoval {
    /// Released registrations, ordered by course code.
    pub released: Vec<ReleasedSeat>,
    /// Waitlists the student was withdrawn from, ordered by course code.
    pub withdrawn: Vec<CourseCode>,
}

/// Read access to course metadata and program plans.
pub trait CourseCatalog: Send + Sync {
    /// Get a course by code.
    fn course(&self, code: &CourseCode) -> Result<Option<Course>, StorageError>;

    /// Get all courses, ordered by code.
    fn courses(&self) -> Result<Vec<Course>, StorageError>;

    /// Courses listed for one program at one level.
    fn program_plan(&self, program: &str, level: u32)
        -> Result<BTreeSet<CourseCode>, StorageError>;

    /// Union of the program's plan across all levels.
    fn program_courses(&self, program: &str) -> Result<BTreeSet<CourseCode>, StorageError>;
}

/// Catalog writes. Invariant checks live in `CatalogManager`; writes that
/// depend on enrollment go through `RegistrationStore`.
pub trait CatalogStore: CourseCatalog {
    /// Insert a new course. Returns Ok(false) if the code already exists.
    fn insert_course(&self, course: Course) -> Result<bool, StorageError>;

    /// Replace an existing course. Returns Ok(false) if it does not exist.
    fn replace_course(&self, course: Course) -> Result<bool, StorageError>;

    /// Delete a course, its plan entries, and its appearances as a prerequisite.
    /// Unguarded; `RegistrationStore::retire_course` checks enrollment first.
    fn delete_course(&self, code: &CourseCode) -> Result<bool, StorageError>;

    /// Add courses to a program plan level. Re-adding is a no-op.
    fn add_to_plan(
        &self,
        program: &str,
        level: u32,
        courses: &[CourseCode],
    ) -> Result<(), StorageError>;

    /// Remove one course from a program plan level.
    fn remove_from_plan(
        &self,
        program: &str,
        level: u32,
        course: &CourseCode,
    ) -> Result<bool, StorageError>;
}

/// Lookup of students and their completed courses.
pub trait StudentDirectory: Send + Sync {
    fn student(&self, id: &StudentId) -> Result<Option<Student>, StorageError>;

    /// Insert a new student. Returns Ok(false) if the id already exists.
    fn insert_student(&self, student: Student) -> Result<bool, StorageError>;

    /// Replace an existing student. Returns Ok(false) if it does not exist.
    fn replace_student(&self, student: Student) -> Result<bool, StorageError>;

    /// Delete the record only. Returns Ok(false) if it does not exist.
    /// Registrations are released through `RegistrationStore::remove_student`.
    fn delete_student(&self, id: &StudentId) -> Result<bool, StorageError>;
}

/// Authoritative record of active registrations.
pub trait EnrollmentLedger: Send + Sync {
    fn enrolled_count(&self, course: &CourseCode) -> Result<u32, StorageError>;

    fn is_registered(&self, student: &StudentId, course: &CourseCode)
        -> Result<bool, StorageError>;

    /// Insert a registration. Fails with `ConstraintViolation` if the pair exists.
    /// Does not check capacity; the coordinator goes through `RegistrationStore::admit`.
    fn add(&self, student: &StudentId, course: &CourseCode) -> Result<(), StorageError>;

    /// Remove a registration. Returns Ok(false) if there was none.
    fn remove(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError>;

    /// Courses the student is registered for, ordered by code.
    fn registered_courses(&self, student: &StudentId) -> Result<Vec<CourseCode>, StorageError>;

    /// Enrolled count of every course with at least one registration.
    fn enrollment_counts(&self) -> Result<BTreeMap<CourseCode, u32>, StorageError>;
}

/// Per-course FIFO of students waiting for a seat.
pub trait WaitlistQueue: Send + Sync {
    /// Add an entry. Returns Ok(false) if the pair is already waiting; the
    /// original stamp is kept.
    fn enqueue(
        &self,
        student: &StudentId,
        course: &CourseCode,
        stamp: RequestStamp,
    ) -> Result<bool, StorageError>;

    /// Remove and return the earliest entry for the course.
    fn dequeue_next(&self, course: &CourseCode) -> Result<Option<StudentId>, StorageError>;

    /// 1-based rank of the student's entry, if any.
    fn position(&self, student: &StudentId, course: &CourseCode)
        -> Result<Option<usize>, StorageError>;

    /// Explicit withdrawal. Returns Ok(false) if the student was not waiting.
    fn withdraw(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError>;

    /// Entries for the course in promotion order.
    fn waitlist(&self, course: &CourseCode) -> Result<Vec<WaitlistEntry>, StorageError>;

    /// Newest stamp across all waitlists, used to resume the request clock.
    fn latest_stamp(&self) -> Result<Option<RequestStamp>, StorageError>;
}

/// Ledger and waitlist together, with every write that must be atomic with
/// the catalog and student records it depends on.
///
/// Capacities and the existence of courses and students are read inside the
/// same atomic unit as the ledger write, never passed in by the caller.
///
/// A seat is free for a student when
/// `enrolled + waiting_ahead_of_student < capacity`, so a newcomer never
/// overtakes students already on the waitlist.
pub trait RegistrationStore: EnrollmentLedger + WaitlistQueue {
    /// Register the student for every listed course with a free seat and
    /// waitlist them for the rest, in one atomic unit. Nothing is written and
    /// `ConstraintViolation` is returned if any pair is already registered, a
    /// course is listed twice, or the student or a course does not exist.
    fn admit(
        &self,
        student: &StudentId,
        courses: &[CourseCode],
        stamp: RequestStamp,
    ) -> Result<Vec<Admission>, StorageError>;

    /// Remove the registration and promote the earliest waitlisted student
    /// into the freed seat, in one atomic unit.
    fn release(&self, student: &StudentId, course: &CourseCode)
        -> Result<SeatRelease, StorageError>;

    /// Replace a course record unless its capacity is below the current
    /// enrollment, then promote waitlisted students into any open seats.
    fn revise_course(&self, course: Course) -> Result<CourseRevision, StorageError>;

    /// Delete a course, its plan entries, and its appearances as a
    /// prerequisite, unless anyone is registered or waitlisted.
    fn retire_course(&self, code: &CourseCode) -> Result<CourseRetirement, StorageError>;

    /// Delete a student record, withdraw them from every waitlist and release
    /// each of their seats to the next waitlisted student. Returns Ok(None) if
    /// the student does not exist.
    fn remove_student(&self, student: &StudentId)
        -> Result<Option<StudentRemoval>, StorageError>;
}

// In-memory implementations for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use parking_lot::RwLock;

    /// In-memory catalog for testing.
    #[derive(Default)]
    pub struct InMemoryCatalog {
        courses: RwLock<BTreeMap<CourseCode, Course>>,
        plans: RwLock<BTreeMap<(String, u32), BTreeSet<CourseCode>>>,
    }

    impl InMemoryCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Build a catalog from courses, failing on duplicate codes.
        pub fn with_courses(courses: impl IntoIterator<Item = Course>) -> Self {
            let catalog = Self::new();
            for course in courses {
                let code = course.code.clone();
                let inserted = catalog.courses.write().insert(code.clone(), course);
                assert!(inserted.is_none(), "duplicate course {}", code);
            }
            catalog
        }
    }

    impl CourseCatalog for InMemoryCatalog {
        fn course(&self, code: &CourseCode) -> Result<Option<Course>, StorageError> {
            Ok(self.courses.read().get(code).cloned())
        }

        fn courses(&self) -> Result<Vec<Course>, StorageError> {
            Ok(self.courses.read().values().cloned().collect())
        }

        fn program_plan(
            &self,
            program: &str,
            level: u32,
        ) -> Result<BTreeSet<CourseCode>, StorageError> {
            Ok(self
                .plans
                .read()
                .get(&(program.to_string(), level))
                .cloned()
                .unwrap_or_default())
        }

        fn program_courses(&self, program: &str) -> Result<BTreeSet<CourseCode>, StorageError> {
            Ok(self
                .plans
                .read()
                .iter()
                .filter(|((p, _), _)| p == program)
                .flat_map(|(_, codes)| codes.iter().cloned())
                .collect())
        }
    }

    impl CatalogStore for InMemoryCatalog {
        fn insert_course(&self, course: Course) -> Result<bool, StorageError> {
            let mut courses = self.courses.write();
            if courses.contains_key(&course.code) {
                return Ok(false);
            }
            courses.insert(course.code.clone(), course);
            Ok(true)
        }

        fn replace_course(&self, course: Course) -> Result<bool, StorageError> {
            let mut courses = self.courses.write();
            match courses.get_mut(&course.code) {
                Some(existing) => {
                    *existing = course;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn delete_course(&self, code: &CourseCode) -> Result<bool, StorageError> {
            let mut courses = self.courses.write();
            if courses.remove(code).is_none() {
                return Ok(false);
            }
            for course in courses.values_mut() {
                course.prerequisites.remove(code);
            }
            for codes in self.plans.write().values_mut() {
                codes.remove(code);
            }
            Ok(true)
        }

        fn add_to_plan(
            &self,
            program: &str,
            level: u32,
            courses: &[CourseCode],
        ) -> Result<(), StorageError> {
            self.plans
                .write()
                .entry((program.to_string(), level))
                .or_default()
                .extend(courses.iter().cloned());
            Ok(())
        }

        fn remove_from_plan(
            &self,
            program: &str,
            level: u32,
            course: &CourseCode,
        ) -> Result<bool, StorageError> {
            Ok(self
                .plans
                .write()
                .get_mut(&(program.to_string(), level))
                .map(|codes| codes.remove(course))
                .unwrap_or(false))
        }
    }

    /// In-memory student directory for testing.
    #[derive(Default)]
    pub struct InMemoryStudentDirectory {
        students: RwLock<HashMap<StudentId, Student>>,
    }

    impl InMemoryStudentDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_students(students: impl IntoIterator<Item = Student>) -> Self {
            let directory = Self::new();
            directory
                .students
                .write()
                .extend(students.into_iter().map(|s| (s.id.clone(), s)));
            directory
        }
    }

    impl StudentDirectory for InMemoryStudentDirectory {
        fn student(&self, id: &StudentId) -> Result<Option<Student>, StorageError> {
            Ok(self.students.read().get(id).cloned())
        }

        fn insert_student(&self, student: Student) -> Result<bool, StorageError> {
            let mut students = self.students.write();
            if students.contains_key(&student.id) {
                return Ok(false);
            }
            students.insert(student.id.clone(), student);
            Ok(true)
        }


        fn replace_student(&self, student: Student) -> Result<bool, StorageError> {
            let mut students = self.students.write();
            match students.get_mut(&student.id) {
                Some(existing) => {
                    *existing = student;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        fn delete_student(&self, id: &StudentId) -> Result<bool, StorageError> {
            Ok(self.students.write().remove(id).is_some())
        }
    }

    fn duplicate(student: &StudentId, course: &CourseCode) -> StorageError {
        StorageError::ConstraintViolation(format!(
            "registration ({}, {}) already exists",
            student, course
        ))
    }

    #[derive(Default)]
    struct RegistrationState {
        registrations: BTreeSet<(CourseCode, StudentId)>,
        /// Each list is kept sorted by stamp.
        waitlists: HashMap<CourseCode, Vec<WaitlistEntry>>,
    }

    impl RegistrationState {
        fn count(&self, course: &CourseCode) -> u32 {
            self.registrations
                .iter()
                .filter(|(c, _)| c == course)
                .count() as u32
        }

        fn is_registered(&self, student: &StudentId, course: &CourseCode) -> bool {
            self.registrations
                .contains(&(course.clone(), student.clone()))
        }

        fn position(&self, student: &StudentId, course: &CourseCode) -> Option<usize> {
            self.waitlists
                .get(course)?
                .iter()
                .position(|e| &e.student == student)
                .map(|idx| idx + 1)
        }

        /// Entries that would be promoted before this student.
        fn waiting_ahead(&self, student: &StudentId, course: &CourseCode) -> u32 {
            match self.position(student, course) {
                Some(position) => (position - 1) as u32,
                None => self.waitlists.get(course).map_or(0, |w| w.len() as u32),
            }
        }

        fn is_waiting(&self, course: &CourseCode) -> bool {
            self.waitlists.get(course).is_some_and(|w| !w.is_empty())
        }

        fn enqueue(&mut self, student: &StudentId, course: &CourseCode, stamp: RequestStamp) -> bool {
            let waitlist = self.waitlists.entry(course.clone()).or_default();
            if waitlist.iter().any(|e| &e.student == student) {
                return false;
            }
            // Equal stamps keep insertion order.
            let idx = waitlist.partition_point(|e| e.stamp <= stamp);
            waitlist.insert(
                idx,
                WaitlistEntry {
                    student: student.clone(),
                    course: course.clone(),
                    stamp,
                },
            );
            true
        }

        fn withdraw(&mut self, student: &StudentId, course: &CourseCode) -> bool {
            match self.waitlists.get_mut(course) {
                Some(waitlist) => {
                    let before = waitlist.len();
                    waitlist.retain(|e| &e.student != student);
                    waitlist.len() != before
                }
                None => false,
            }
        }

        fn dequeue_next(&mut self, course: &CourseCode) -> Option<StudentId> {
            let waitlist = self.waitlists.get_mut(course)?;
            if waitlist.is_empty() {
                return None;
            }
            Some(waitlist.remove(0).student)
        }

        /// Move the head of the waitlist into a seat if `count < capacity`.
        fn promote_next(&mut self, course: &CourseCode, capacity: u32) -> Option<StudentId> {
            if self.count(course) >= capacity {
                return None;
            }
            let next = self.dequeue_next(course)?;
            self.registrations.insert((course.clone(), next.clone()));
            Some(next)
        }

        fn fill(&mut self, course: &CourseCode, capacity: u32) -> Vec<StudentId> {
            std::iter::from_fn(|| self.promote_next(course, capacity)).collect()
        }
    }

    /// In-memory registration store for testing. One lock guards ledger and
    /// waitlists, and catalog and student records are read or removed while
    /// it is held, so every compound write is atomic.
    pub struct InMemoryRegistrationStore {
        state: RwLock<RegistrationState>,
        catalog: Arc<InMemoryCatalog>,
        students: Arc<InMemoryStudentDirectory>,
    }

    impl InMemoryRegistrationStore {
        pub fn new(catalog: Arc<InMemoryCatalog>, students: Arc<InMemoryStudentDirectory>) -> Self {
            Self {
                state: RwLock::new(RegistrationState::default()),
                catalog,
                students,
            }
        }

        fn capacity(&self, course: &CourseCode) -> Result<Option<u32>, StorageError> {
            Ok(self.catalog.course(course)?.map(|c| c.capacity))
        }
    }

    impl EnrollmentLedger for InMemoryRegistrationStore {
        fn enrolled_count(&self, course: &CourseCode) -> Result<u32, StorageError> {
            Ok(self.state.read().count(course))
        }

        fn is_registered(
            &self,
            student: &StudentId,
            course: &CourseCode,
        ) -> Result<bool, StorageError> {
            Ok(self.state.read().is_registered(student, course))
        }

        fn add(&self, student: &StudentId, course: &CourseCode) -> Result<(), StorageError> {
            let mut state = self.state.write();
            if !state
                .registrations
                .insert((course.clone(), student.clone()))
            {
                return Err(duplicate(student, course));
            }
            Ok(())
        }

        fn remove(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError> {
            Ok(self
                .state
                .write()
                .registrations
                .remove(&(course.clone(), student.clone())))
        }

        fn registered_courses(
            &self,
            student: &StudentId,
        ) -> Result<Vec<CourseCode>, StorageError> {
            Ok(self
                .state
                .read()
                .registrations
                .iter()
                .filter(|(_, s)| s == student)
                .map(|(c, _)| c.clone())
                .collect())
        }

        fn enrollment_counts(&self) -> Result<BTreeMap<CourseCode, u32>, StorageError> {
            let mut counts = BTreeMap::new();
            for (course, _) in &self.state.read().registrations {
                *counts.entry(course.clone()).or_insert(0) += 1;
            }
            Ok(counts)
        }
    }

    impl WaitlistQueue for InMemoryRegistrationStore {
        fn enqueue(
            &self,
            student: &StudentId,
            course: &CourseCode,
            stamp: RequestStamp,
        ) -> Result<bool, StorageError> {
            Ok(self.state.write().enqueue(student, course, stamp))
        }

        fn dequeue_next(&self, course: &CourseCode) -> Result<Option<StudentId>, StorageError> {
            Ok(self.state.write().dequeue_next(course))
        }

        fn position(
            &self,
            student: &StudentId,
            course: &CourseCode,
        ) -> Result<Option<usize>, StorageError> {
            Ok(self.state.read().position(student, course))
        }

        fn withdraw(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError> {
            Ok(self.state.write().withdraw(student, course))
        }

        fn waitlist(&self, course: &CourseCode) -> Result<Vec<WaitlistEntry>, StorageError> {
            Ok(self
                .state
                .read()
                .waitlists
                .get(course)
                .cloned()
                .unwrap_or_default())
        }

        fn latest_stamp(&self) -> Result<Option<RequestStamp>, StorageError> {
            Ok(self
                .state
                .read()
                .waitlists
                .values()
                .flat_map(|w| w.iter().map(|e| e.stamp))
                .max())
        }
    }

    impl RegistrationStore for InMemoryRegistrationStore {
        fn admit(
            &self,
            student: &StudentId,
            courses: &[CourseCode],
            stamp: RequestStamp,
        ) -> Result<Vec<Admission>, StorageError> {
            let mut state = self.state.write();

            if self.students.student(student)?.is_none() {
                return Err(StorageError::ConstraintViolation(format!(
                    "student {} does not exist",
                    student
                )));
            }

            let mut seen = HashSet::with_capacity(courses.len());
            let mut capacities = Vec::with_capacity(courses.len());
            for course in courses {
                if !seen.insert(course) || state.is_registered(student, course) {
                    return Err(duplicate(student, course));
                }
                let capacity = self.capacity(course)?.ok_or_else(|| {
                    StorageError::ConstraintViolation(format!("course {} does not exist", course))
                })?;
                capacities.push(capacity);
            }

            let mut admissions = Vec::with_capacity(courses.len());
            for (course, capacity) in courses.iter().zip(capacities) {
                let taken = state.count(course) + state.waiting_ahead(student, course);
                if taken < capacity {
                    state.withdraw(student, course);
                    state
                        .registrations
                        .insert((course.clone(), student.clone()));
                    admissions.push(Admission::Registered(course.clone()));
                } else {
                    state.enqueue(student, course, stamp);
                    let position = state.position(student, course).unwrap_or(0);
                    admissions.push(Admission::Waitlisted {
                        course: course.clone(),
                        position,
                    });
                }
            }

            Ok(admissions)
        }

        fn release(
            &self,
            student: &StudentId,
            course: &CourseCode,
        ) -> Result<SeatRelease, StorageError> {
            let mut state = self.state.write();

            if !state
                .registrations
                .remove(&(course.clone(), student.clone()))
            {
                return Ok(SeatRelease::NotRegistered);
            }

            let capacity = self.capacity(course)?.unwrap_or(0);
            let promoted = state.promote_next(course, capacity);
            Ok(SeatRelease::Released { promoted })
        }

        fn revise_course(&self, course: Course) -> Result<CourseRevision, StorageError> {
            let mut state = self.state.write();

            if self.capacity(&course.code)?.is_none() {
                return Ok(CourseRevision::NotFound);
            }
            let enrolled = state.count(&course.code);
            if course.capacity < enrolled {
                return Ok(CourseRevision::BelowEnrollment { enrolled });
            }

            let code = course.code.clone();
            let capacity = course.capacity;
            self.catalog.replace_course(course)?;
            let promoted = state.fill(&code, capacity);
            Ok(CourseRevision::Revised { promoted })
        }

        fn retire_course(&self, code: &CourseCode) -> Result<CourseRetirement, StorageError> {
            let state = self.state.write();

            if self.capacity(code)?.is_none() {
                return Ok(CourseRetirement::NotFound);
            }
            if state.count(code) > 0 || state.is_waiting(code) {
                return Ok(CourseRetirement::InUse);
            }
            self.catalog.delete_course(code)?;
            Ok(CourseRetirement::Retired)
        }

        fn remove_student(
            &self,
            student: &StudentId,
        ) -> Result<Option<StudentRemoval>, StorageError> {
            let mut state = self.state.write();

            if !self.students.delete_student(student)? {
                return Ok(None);
            }

            let mut withdrawn: Vec<CourseCode> = state
                .waitlists
                .iter()
                .filter(|(_, w)| w.iter().any(|e| &e.student == student))
                .map(|(course, _)| course.clone())
                .collect();
            withdrawn.sort();
            for course in &withdrawn {
                state.withdraw(student, course);
            }

            let held: Vec<CourseCode> = state
                .registrations
                .iter()
                .filter(|(_, s)| s == student)
                .map(|(c, _)| c.clone())
                .collect();
            let mut released = Vec::with_capacity(held.len());
            for course in held {
                state.registrations.remove(&(course.clone(), student.clone()));
                let capacity = self.capacity(&course)?.unwrap_or(0);
                let promoted = state.promote_next(&course, capacity);
                released.push(ReleasedSeat { course, promoted });
            }

            Ok(Some(StudentRemoval { released, withdrawn }))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn sid(id: &str) -> StudentId {
            StudentId::new(id)
        }

        fn code(c: &str) -> CourseCode {
            CourseCode::new(c)
        }

        /// Store over a catalog of `(code, capacity)` courses and the given students.
        fn create_test_store(courses: &[(&str, u32)], students: &[&str]) -> InMemoryRegistrationStore {
            let catalog = InMemoryCatalog::with_courses(
                courses
                    .iter()
                    .map(|(c, capacity)| Course::new(*c, *c, 3, vec![], "B-1", *capacity)),
            );
            let directory = InMemoryStudentDirectory::with_students(
                students.iter().map(|id| Student::new(*id, *id, "Computer", 1)),
            );
            InMemoryRegistrationStore::new(Arc::new(catalog), Arc::new(directory))
        }

        #[test]
        fn test_ledger_add_rejects_duplicate() {
            let store = create_test_store(&[], &[]);

            store.add(&sid("S1"), &code("EE250")).unwrap();
            assert!(matches!(
                store.add(&sid("S1"), &code("EE250")),
                Err(StorageError::ConstraintViolation(_))
            ));
            assert_eq!(store.enrolled_count(&code("EE250")).unwrap(), 1);
        }

        #[test]
        fn test_enqueue_is_idempotent() {
            let store = create_test_store(&[], &[]);

            assert!(store
                .enqueue(&sid("S1"), &code("EE250"), RequestStamp::new(10, 0))
                .unwrap());
            assert!(!store
                .enqueue(&sid("S1"), &code("EE250"), RequestStamp::new(20, 0))
                .unwrap());

            let waitlist = store.waitlist(&code("EE250")).unwrap();
            assert_eq!(waitlist.len(), 1);
            assert_eq!(waitlist[0].stamp, RequestStamp::new(10, 0));
        }

        #[test]
        fn test_waitlist_orders_by_stamp() {
            let store = create_test_store(&[], &[]);
            let course = code("EE250");

            store.enqueue(&sid("late"), &course, RequestStamp::new(30, 0)).unwrap();
            store.enqueue(&sid("early"), &course, RequestStamp::new(10, 0)).unwrap();
            store.enqueue(&sid("tie"), &course, RequestStamp::new(10, 0)).unwrap();

            assert_eq!(store.position(&sid("early"), &course).unwrap(), Some(1));
            assert_eq!(store.position(&sid("tie"), &course).unwrap(), Some(2));
            assert_eq!(store.position(&sid("late"), &course).unwrap(), Some(3));

            assert_eq!(store.dequeue_next(&course).unwrap(), Some(sid("early")));
            assert_eq!(store.position(&sid("late"), &course).unwrap(), Some(2));
        }

        #[test]
        fn test_admit_respects_capacity() {
            let store = create_test_store(&[("EE250", 1)], &["S1", "S2"]);
            let stamp = RequestStamp::new(1, 0);

            let first = store.admit(&sid("S1"), &[code("EE250")], stamp).unwrap();
            assert_eq!(first, vec![Admission::Registered(code("EE250"))]);

            let second = store.admit(&sid("S2"), &[code("EE250")], stamp).unwrap();
            assert_eq!(
                second,
                vec![Admission::Waitlisted {
                    course: code("EE250"),
                    position: 1
                }]
            );
            assert_eq!(store.enrolled_count(&code("EE250")).unwrap(), 1);
        }

        #[test]
        fn test_admit_reads_current_capacity() {
            let store = create_test_store(&[("EE250", 3)], &["S1", "S2", "S3"]);
            let ee250 = code("EE250");
            store.add(&sid("S1"), &ee250).unwrap();
            store.add(&sid("S2"), &ee250).unwrap();

            let mut smaller = store.catalog.course(&ee250).unwrap().unwrap();
            smaller.capacity = 2;
            assert_eq!(
                store.revise_course(smaller).unwrap(),
                CourseRevision::Revised { promoted: vec![] }
            );

            let admissions = store
                .admit(&sid("S3"), &[ee250.clone()], RequestStamp::new(1, 0))
                .unwrap();
            assert!(matches!(admissions[0], Admission::Waitlisted { .. }));
            assert_eq!(store.enrolled_count(&ee250).unwrap(), 2);
        }

        #[test]
        fn test_admit_rejects_missing_records() {
            let store = create_test_store(&[("EE250", 5)], &["S1"]);

            assert!(matches!(
                store.admit(&sid("ghost"), &[code("EE250")], RequestStamp::new(1, 0)),
                Err(StorageError::ConstraintViolation(_))
            ));
            assert!(matches!(
                store.admit(&sid("S1"), &[code("EE250"), code("EE999")], RequestStamp::new(1, 0)),
                Err(StorageError::ConstraintViolation(_))
            ));
            assert!(matches!(
                store.admit(&sid("S1"), &[code("EE250"), code("EE250")], RequestStamp::new(1, 0)),
                Err(StorageError::ConstraintViolation(_))
            ));
            assert_eq!(store.enrolled_count(&code("EE250")).unwrap(), 0);
        }

        #[test]
        fn test_admit_duplicate_writes_nothing() {
            let store = create_test_store(&[("EE250", 10), ("EE301", 10)], &["S1"]);
            store.add(&sid("S1"), &code("EE301")).unwrap();

            let result = store.admit(
                &sid("S1"),
                &[code("EE250"), code("EE301")],
                RequestStamp::new(1, 0),
            );
            assert!(matches!(result, Err(StorageError::ConstraintViolation(_))));
            assert_eq!(store.enrolled_count(&code("EE250")).unwrap(), 0);
        }

        #[test]
        fn test_newcomer_does_not_overtake_waitlist() {
            let store = create_test_store(&[("EE250", 1)], &["waiting", "newcomer"]);
            let course = code("EE250");
            store
                .enqueue(&sid("waiting"), &course, RequestStamp::new(1, 0))
                .unwrap();

            // A seat is nominally free, but one student is already waiting.
            let admissions = store
                .admit(&sid("newcomer"), &[course.clone()], RequestStamp::new(2, 0))
                .unwrap();
            assert_eq!(
                admissions,
                vec![Admission::Waitlisted {
                    course: course.clone(),
                    position: 2
                }]
            );

            let unchanged = store.catalog.course(&course).unwrap().unwrap();
            assert_eq!(
                store.revise_course(unchanged).unwrap(),
                CourseRevision::Revised {
                    promoted: vec![sid("waiting")]
                }
            );
            assert!(store.is_registered(&sid("waiting"), &course).unwrap());
        }

        #[test]
        fn test_release_promotes_head() {
            let store = create_test_store(&[("EE250", 1)], &[]);
            let course = code("EE250");
            store.add(&sid("S1"), &course).unwrap();
            store.enqueue(&sid("S2"), &course, RequestStamp::new(1, 0)).unwrap();
            store.enqueue(&sid("S3"), &course, RequestStamp::new(2, 0)).unwrap();

            let release = store.release(&sid("S1"), &course).unwrap();
            assert_eq!(
                release,
                SeatRelease::Released {
                    promoted: Some(sid("S2"))
                }
            );
            assert!(store.is_registered(&sid("S2"), &course).unwrap());
            assert_eq!(store.position(&sid("S3"), &course).unwrap(), Some(1));
            assert_eq!(store.enrolled_count(&course).unwrap(), 1);

            assert_eq!(
                store.release(&sid("S1"), &course).unwrap(),
                SeatRelease::NotRegistered
            );
        }

        #[test]
        fn test_revise_below_enrollment_refused() {
            let store = create_test_store(&[("EE250", 3)], &[]);
            let course = code("EE250");
            store.add(&sid("S1"), &course).unwrap();
            store.add(&sid("S2"), &course).unwrap();

            let mut smaller = store.catalog.course(&course).unwrap().unwrap();
            smaller.capacity = 1;
            assert_eq!(
                store.revise_course(smaller).unwrap(),
                CourseRevision::BelowEnrollment { enrolled: 2 }
            );
            assert_eq!(store.catalog.course(&course).unwrap().unwrap().capacity, 3);

            let missing = Course::new("EE999", "Ghost", 3, vec![], "B-1", 4);
            assert_eq!(store.revise_course(missing).unwrap(), CourseRevision::NotFound);
        }

        #[test]
        fn test_retire_course_guarded() {
            let store = create_test_store(&[("EE250", 1), ("EE301", 1)], &[]);
            store
                .enqueue(&sid("S1"), &code("EE250"), RequestStamp::new(1, 0))
                .unwrap();

            assert_eq!(
                store.retire_course(&code("EE250")).unwrap(),
                CourseRetirement::InUse
            );
            assert_eq!(
                store.retire_course(&code("EE301")).unwrap(),
                CourseRetirement::Retired
            );
            assert_eq!(
                store.retire_course(&code("EE301")).unwrap(),
                CourseRetirement::NotFound
            );
            assert!(store.catalog.course(&code("EE250")).unwrap().is_some());
        }

        #[test]
        fn test_remove_student_releases_and_withdraws() {
            let store = create_test_store(&[("EE250", 1), ("EE301", 1)], &["S1", "S2", "S3"]);
            let ee250 = code("EE250");
            let ee301 = code("EE301");
            store.admit(&sid("S1"), &[ee250.clone()], RequestStamp::new(1, 0)).unwrap();
            store.admit(&sid("S2"), &[ee250.clone(), ee301.clone()], RequestStamp::new(2, 0)).unwrap();
            store.admit(&sid("S3"), &[ee301.clone()], RequestStamp::new(3, 0)).unwrap();

            let removal = store.remove_student(&sid("S2")).unwrap().unwrap();
            assert_eq!(
                removal,
                StudentRemoval {
                    released: vec![ReleasedSeat {
                        course: ee301.clone(),
                        promoted: Some(sid("S3")),
                    }],
                    withdrawn: vec![ee250.clone()],
                }
            );
            assert!(store.students.student(&sid("S2")).unwrap().is_none());
            assert!(store.is_registered(&sid("S3"), &ee301).unwrap());
            assert!(store.waitlist(&ee250).unwrap().is_empty());
            assert!(store.remove_student(&sid("S2")).unwrap().is_none());
        }

        #[test]
        fn test_catalog_delete_strips_references() {
            let catalog = InMemoryCatalog::with_courses([
                Course::new("EE250", "Circuits", 4, vec![], "B-1", 40),
                Course::new("EE301", "Circuits II", 3, vec![], "B-2", 40).with_prerequisites(["EE250"]),
            ]);
            catalog
                .add_to_plan("Computer", 2, &[code("EE250"), code("EE301")])
                .unwrap();

            assert!(catalog.delete_course(&code("EE250")).unwrap());

            let ee301 = catalog.course(&code("EE301")).unwrap().unwrap();
            assert!(ee301.prerequisites.is_empty());
            assert_eq!(
                catalog.program_courses("Computer").unwrap(),
                BTreeSet::from([code("EE301")])
            );
        }
    }
}
