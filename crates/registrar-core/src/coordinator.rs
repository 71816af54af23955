use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::clock::RequestClock;
use crate::course::Course;
use crate::error::RegistrationError;
use crate::ids::{CourseCode, StudentId};
use crate::policy::RegistrationPolicy;
use crate::storage::{
    Admission, CourseCatalog, EnrollmentLedger, RegistrationStore, SeatRelease, StudentDirectory,
    WaitlistQueue,
};
use crate::student::Student;
use crate::timetable::Timetable;
use crate::validation::{RegistrationSnapshot, ValidationReport, Validator};

/// Result of a registration request. Both lists may be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub registered: Vec<CourseCode>,
    pub waitlisted: Vec<CourseCode>,
}

impl std::fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |codes: &[CourseCode]| {
            codes
                .iter()
                .map(CourseCode::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match (self.registered.is_empty(), self.waitlisted.is_empty()) {
            (false, true) => write!(f, "Registered: {}", join(&self.registered)),
            (true, false) => write!(f, "Waitlisted: {}", join(&self.waitlisted)),
            (false, false) => write!(
                f,
                "Registered: {}; Waitlisted: {}",
                join(&self.registered),
                join(&self.waitlisted)
            ),
            (true, true) => write!(f, "Nothing registered"),
        }
    }
}

/// Result of dropping a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropOutcome {
    pub dropped: CourseCode,
    pub promoted: Option<StudentId>,
}

impl std::fmt::Display for DropOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.promoted {
            Some(student) => write!(f, "Dropped {}; promoted {}", self.dropped, student),
            None => write!(f, "Dropped {}", self.dropped),
        }
    }
}

/// Seat usage of one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseStatus {
    pub course: Course,
    pub enrolled: u32,
    pub waitlisted: usize,
}

/// Registration coordinator.
///
/// Validates requests against a snapshot of current state, then commits
/// through the store's atomic `admit` and `release` operations. Seat
/// accounting never trusts the snapshot.
pub struct RegistrationCoordinator<C, D, R>
where
    C: CourseCatalog,
    D: StudentDirectory,
    R: RegistrationStore,
{
    catalog: Arc<C>,
    students: Arc<D>,
    store: Arc<R>,
    validator: Validator,
    clock: RequestClock,
}

impl<C, D, R> RegistrationCoordinator<C, D, R>
where
    C: CourseCatalog,
    D: StudentDirectory,
    R: RegistrationStore,
{
    pub fn new(
        catalog: Arc<C>,
        students: Arc<D>,
        store: Arc<R>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            catalog,
            students,
            store,
            validator: Validator::new(policy),
            clock: RequestClock::new(),
        }
    }

    /// Replace the request clock, e.g. with one resumed from persisted state.
    pub fn with_clock(mut self, clock: RequestClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.validator.policy()
    }

    /// Validate a course set for a student described by value. Nothing is
    /// read from the ledger; `enrollments` only feeds the report.
    pub fn validate_registration(
        &self,
        selected: &[CourseCode],
        completed: &BTreeSet<CourseCode>,
        program: &str,
        level: u32,
        enrollments: &HashMap<CourseCode, u32>,
    ) -> Result<ValidationReport, RegistrationError> {
        let mut courses = HashMap::with_capacity(selected.len());
        for code in selected {
            if let Some(course) = self.catalog.course(code)? {
                courses.insert(code.clone(), course);
            }
        }

        let snapshot = RegistrationSnapshot {
            selected: selected.to_vec(),
            courses,
            completed: completed.clone(),
            program: program.to_string(),
            level,
            plan_courses: self.catalog.program_courses(program)?,
            enrollments: enrollments.clone(),
            registered: Vec::new(),
        };

        Ok(self.validator.validate(&snapshot)?)
    }

    /// Register a student for a batch of courses. Full courses put the
    /// student on the waitlist instead of rejecting the batch.
    pub fn register_courses(
        &self,
        student_id: &StudentId,
        selected: &[CourseCode],
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let student = self.load_student(student_id)?;

        for code in selected {
            if self.store.is_registered(&student.id, code)? {
                return Err(RegistrationError::DuplicateRegistration {
                    student: student.id.clone(),
                    course: code.clone(),
                });
            }
        }

        let snapshot = self.snapshot_for(&student, selected)?;
        if let Err(e) = self.validator.validate(&snapshot) {
            tracing::info!("Rejected registration for {}: {}", student.id, e);
            return Err(e.into());
        }

        // Capacity is re-read by the store inside the admitting transaction.
        let stamp = self.clock.now();
        let admissions = self.store.admit(&student.id, selected, stamp)?;

        let mut outcome = RegistrationOutcome::default();
        for admission in admissions {
            match admission {
                Admission::Registered(course) => {
                    tracing::info!("Registered {} for {}", student.id, course);
                    outcome.registered.push(course);
                }
                Admission::Waitlisted { course, position } => {
                    tracing::info!(
                        "Waitlisted {} for {} at position {}",
                        student.id,
                        course,
                        position
                    );
                    outcome.waitlisted.push(course);
                }
            }
        }

        Ok(outcome)
    }

    /// Drop a registration and promote the earliest waitlisted student into
    /// the freed seat. The promoted student is not re-validated.
    pub fn drop_course(
        &self,
        student_id: &StudentId,
        course: &CourseCode,
    ) -> Result<DropOutcome, RegistrationError> {
        let student = self.load_student(student_id)?;
        self.load_course(course)?;

        match self.store.release(&student.id, course)? {
            SeatRelease::NotRegistered => Err(RegistrationError::NotRegistered {
                student: student.id,
                course: course.clone(),
            }),
            SeatRelease::Released { promoted } => {
                tracing::info!("Dropped {} from {}", student.id, course);
                if let Some(next) = &promoted {
                    tracing::info!("Promoted {} into {} from waitlist", next, course);
                }
                Ok(DropOutcome {
                    dropped: course.clone(),
                    promoted,
                })
            }
        }
    }

    /// Leave a course's waitlist.
    pub fn withdraw_from_waitlist(
        &self,
        student_id: &StudentId,
        course: &CourseCode,
    ) -> Result<(), RegistrationError> {
        let student = self.load_student(student_id)?;
        self.load_course(course)?;

        if !self.store.withdraw(&student.id, course)? {
            return Err(RegistrationError::NotWaitlisted {
                student: student.id,
                course: course.clone(),
            });
        }
        tracing::info!("Withdrew {} from waitlist for {}", student.id, course);
        Ok(())
    }

    pub fn get_registered_courses(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<CourseCode>, RegistrationError> {
        let student = self.load_student(student_id)?;
        Ok(self.store.registered_courses(&student.id)?)
    }

    /// 1-based waitlist position.
    pub fn get_waitlist_position(
        &self,
        student_id: &StudentId,
        course: &CourseCode,
    ) -> Result<usize, RegistrationError> {
        let student = self.load_student(student_id)?;
        self.load_course(course)?;

        self.store
            .position(&student.id, course)?
            .ok_or_else(|| RegistrationError::NotWaitlisted {
                student: student.id,
                course: course.clone(),
            })
    }

    /// Weekly timetable of the student's registered courses.
    pub fn timetable(&self, student_id: &StudentId) -> Result<Timetable, RegistrationError> {
        let codes = self.get_registered_courses(student_id)?;
        let mut courses = Vec::with_capacity(codes.len());
        for code in &codes {
            courses.push(self.load_course(code)?);
        }
        Ok(Timetable::build(&courses))
    }

    pub fn course_status(&self, code: &CourseCode) -> Result<CourseStatus, RegistrationError> {
        let course = self.load_course(code)?;
        Ok(CourseStatus {
            enrolled: self.store.enrolled_count(code)?,
            waitlisted: self.store.waitlist(code)?.len(),
            course,
        })
    }

    fn load_student(&self, id: &StudentId) -> Result<Student, RegistrationError> {
        self.students
            .student(id)?
            .ok_or_else(|| RegistrationError::UnknownStudent(id.clone()))
    }

    fn load_course(&self, code: &CourseCode) -> Result<Course, RegistrationError> {
        self.catalog
            .course(code)?
            .ok_or_else(|| RegistrationError::UnknownCourse(code.clone()))
    }

    fn snapshot_for(
        &self,
        student: &Student,
        selected: &[CourseCode],
    ) -> Result<RegistrationSnapshot, RegistrationError> {
        let registered = self.store.registered_courses(&student.id)?;

        let mut courses = HashMap::with_capacity(selected.len() + registered.len());
        let mut enrollments = HashMap::with_capacity(selected.len());
        for code in selected.iter().chain(registered.iter()) {
            if courses.contains_key(code) {
                continue;
            }
            if let Some(course) = self.catalog.course(code)? {
                courses.insert(code.clone(), course);
            }
        }
        for code in selected {
            enrollments.insert(code.clone(), self.store.enrolled_count(code)?);
        }

        Ok(RegistrationSnapshot {
            selected: selected.to_vec(),
            courses,
            completed: student.completed.clone(),
            program: student.program.clone(),
            level: student.level,
            plan_courses: self.catalog.program_courses(&student.program)?,
            enrollments,
            registered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::TimeSlot;
    use crate::error::{StorageError, ValidationError};
    use crate::storage::memory::{
        InMemoryCatalog, InMemoryRegistrationStore, InMemoryStudentDirectory,
    };
    use crate::catalog::CatalogManager;
    use crate::course::CoursePatch;
    use crate::storage::CatalogStore;
    use parking_lot::Mutex;

    type TestCoordinator =
        RegistrationCoordinator<InMemoryCatalog, InMemoryStudentDirectory, InMemoryRegistrationStore>;

    fn code(c: &str) -> CourseCode {
        CourseCode::new(c)
    }

    fn sid(s: &str) -> StudentId {
        StudentId::new(s)
    }

    fn course(code: &str, credits: u32, capacity: u32, days: &str, start: &str, end: &str) -> Course {
        Course::new(
            code,
            code,
            credits,
            vec![TimeSlot::parse(days, start, end).unwrap()],
            "B-23",
            capacity,
        )
    }

    struct Fixture {
        coordinator: TestCoordinator,
        store: Arc<InMemoryRegistrationStore>,
    }

    fn fixture(courses: Vec<Course>, students: Vec<Student>, policy: RegistrationPolicy) -> Fixture {
        let codes: Vec<CourseCode> = courses.iter().map(|c| c.code.clone()).collect();
        let catalog = Arc::new(InMemoryCatalog::with_courses(courses));
        catalog.add_to_plan("Computer", 1, &codes).unwrap();
        let directory = Arc::new(InMemoryStudentDirectory::with_students(students));
        let store = Arc::new(InMemoryRegistrationStore::new(catalog.clone(), directory.clone()));

        Fixture {
            coordinator: RegistrationCoordinator::new(catalog, directory, store.clone(), policy),
            store,
        }
    }

    fn lenient() -> RegistrationPolicy {
        RegistrationPolicy::new(0, 18).unwrap()
    }

    fn students(ids: &[&str]) -> Vec<Student> {
        ids.iter()
            .map(|id| Student::new(*id, *id, "Computer", 3))
            .collect()
    }

    #[test]
    fn test_single_seat_waitlist_and_promotion() {
        let f = fixture(
            vec![course("EE250", 4, 1, "Mon", "10:00", "11:20")],
            students(&["S1", "S2"]),
            lenient(),
        );
        let ee250 = code("EE250");

        let first = f.coordinator.register_courses(&sid("S1"), &[ee250.clone()]).unwrap();
        assert_eq!(first.registered, vec![ee250.clone()]);
        assert!(first.waitlisted.is_empty());

        let second = f.coordinator.register_courses(&sid("S2"), &[ee250.clone()]).unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.waitlisted, vec![ee250.clone()]);
        assert_eq!(f.coordinator.get_waitlist_position(&sid("S2"), &ee250).unwrap(), 1);

        let dropped = f.coordinator.drop_course(&sid("S1"), &ee250).unwrap();
        assert_eq!(
            dropped,
            DropOutcome {
                dropped: ee250.clone(),
                promoted: Some(sid("S2")),
            }
        );
        assert_eq!(
            f.coordinator.get_registered_courses(&sid("S2")).unwrap(),
            vec![ee250.clone()]
        );
        assert!(f.coordinator.get_registered_courses(&sid("S1")).unwrap().is_empty());
        assert_eq!(f.store.enrolled_count(&ee250).unwrap(), 1);
    }

    #[test]
    fn test_fifo_promotion_order() {
        let f = fixture(
            vec![course("EE250", 4, 1, "Mon", "10:00", "11:20")],
            students(&["S1", "A", "B"]),
            lenient(),
        );
        let ee250 = code("EE250");

        f.coordinator.register_courses(&sid("S1"), &[ee250.clone()]).unwrap();
        f.coordinator.register_courses(&sid("A"), &[ee250.clone()]).unwrap();
        f.coordinator.register_courses(&sid("B"), &[ee250.clone()]).unwrap();
        assert_eq!(f.coordinator.get_waitlist_position(&sid("B"), &ee250).unwrap(), 2);

        let dropped = f.coordinator.drop_course(&sid("S1"), &ee250).unwrap();
        assert_eq!(dropped.promoted, Some(sid("A")));
        assert_eq!(f.coordinator.get_waitlist_position(&sid("B"), &ee250).unwrap(), 1);
    }

    #[test]
    fn test_mixed_batch_registers_and_waitlists() {
        let f = fixture(
            vec![
                course("EE250", 4, 1, "Mon", "10:00", "11:20"),
                course("EE201", 3, 40, "Tue", "10:00", "11:20"),
            ],
            students(&["S1", "S2"]),
            lenient(),
        );

        f.coordinator.register_courses(&sid("S1"), &[code("EE250")]).unwrap();
        let outcome = f
            .coordinator
            .register_courses(&sid("S2"), &[code("EE250"), code("EE201")])
            .unwrap();

        assert_eq!(outcome.registered, vec![code("EE201")]);
        assert_eq!(outcome.waitlisted, vec![code("EE250")]);
        assert_eq!(outcome.to_string(), "Registered: EE201; Waitlisted: EE250");
    }

    #[test]
    fn test_round_trip_restores_count() {
        let f = fixture(
            vec![course("EE250", 4, 10, "Mon", "10:00", "11:20")],
            students(&["S1"]),
            lenient(),
        );
        let ee250 = code("EE250");
        let before = f.store.enrolled_count(&ee250).unwrap();

        f.coordinator.register_courses(&sid("S1"), &[ee250.clone()]).unwrap();
        let dropped = f.coordinator.drop_course(&sid("S1"), &ee250).unwrap();

        assert_eq!(dropped.promoted, None);
        assert_eq!(f.store.enrolled_count(&ee250).unwrap(), before);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let f = fixture(
            vec![course("EE250", 4, 3, "Mon", "10:00", "11:20")],
            students(&["S1", "S2", "S3", "S4", "S5", "S6"]),
            lenient(),
        );
        let ee250 = code("EE250");

        for id in ["S1", "S2", "S3", "S4", "S5", "S6"] {
            f.coordinator.register_courses(&sid(id), &[ee250.clone()]).unwrap();
            assert!(f.store.enrolled_count(&ee250).unwrap() <= 3);
        }
        for id in ["S2", "S4", "S5"] {
            f.coordinator.drop_course(&sid(id), &ee250).unwrap();
            assert!(f.store.enrolled_count(&ee250).unwrap() <= 3);
        }

        assert_eq!(f.store.enrolled_count(&ee250).unwrap(), 3);
        assert!(f.store.waitlist(&ee250).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_requests_respect_capacity() {
        let ids: Vec<String> = (0..12).map(|i| format!("S{}", i)).collect();
        let f = fixture(
            vec![course("EE250", 4, 3, "Mon", "10:00", "11:20")],
            ids.iter().map(|id| Student::new(id.as_str(), id.as_str(), "Computer", 3)).collect(),
            lenient(),
        );
        let ee250 = code("EE250");

        std::thread::scope(|scope| {
            for id in &ids {
                let coordinator = &f.coordinator;
                let ee250 = ee250.clone();
                scope.spawn(move || {
                    coordinator
                        .register_courses(&StudentId::new(id.as_str()), &[ee250])
                        .unwrap();
                });
            }
        });

        assert_eq!(f.store.enrolled_count(&ee250).unwrap(), 3);
        let waitlist = f.store.waitlist(&ee250).unwrap();
        assert_eq!(waitlist.len(), 9);
        assert!(waitlist.windows(2).all(|w| w[0].stamp < w[1].stamp));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let f = fixture(
            vec![
                course("EE250", 4, 10, "Mon", "10:00", "11:20"),
                course("EE201", 3, 10, "Tue", "10:00", "11:20"),
            ],
            students(&["S1"]),
            lenient(),
        );

        f.coordinator.register_courses(&sid("S1"), &[code("EE250")]).unwrap();
        let result = f
            .coordinator
            .register_courses(&sid("S1"), &[code("EE201"), code("EE250")]);

        assert_eq!(
            result,
            Err(RegistrationError::DuplicateRegistration {
                student: sid("S1"),
                course: code("EE250"),
            })
        );
        // No partial commit of EE201.
        assert!(!f.store.is_registered(&sid("S1"), &code("EE201")).unwrap());
    }

    #[test]
    fn test_repeated_waitlist_request_keeps_one_entry() {
        let f = fixture(
            vec![course("EE250", 4, 1, "Mon", "10:00", "11:20")],
            students(&["S1", "S2"]),
            lenient(),
        );
        let ee250 = code("EE250");

        f.coordinator.register_courses(&sid("S1"), &[ee250.clone()]).unwrap();
        f.coordinator.register_courses(&sid("S2"), &[ee250.clone()]).unwrap();
        f.coordinator.register_courses(&sid("S2"), &[ee250.clone()]).unwrap();

        assert_eq!(f.store.waitlist(&ee250).unwrap().len(), 1);
    }

    #[test]
    fn test_validation_failure_has_no_side_effects() {
        let f = fixture(
            vec![
                course("EE250", 4, 10, "Mon", "10:00", "11:20"),
                course("EE201", 3, 10, "Mon", "10:00", "11:20"),
            ],
            students(&["S1"]),
            lenient(),
        );

        let result = f
            .coordinator
            .register_courses(&sid("S1"), &[code("EE250"), code("EE201")]);

        assert!(matches!(
            result,
            Err(RegistrationError::Validation(ValidationError::ScheduleConflict { .. }))
        ));
        assert_eq!(f.store.enrolled_count(&code("EE250")).unwrap(), 0);
        assert_eq!(f.store.enrolled_count(&code("EE201")).unwrap(), 0);
    }

    #[test]
    fn test_incremental_registration_checks_prior_courses() {
        let f = fixture(
            vec![
                course("EE250", 4, 10, "Mon", "10:00", "11:20"),
                course("EE201", 3, 10, "Mon", "11:00", "12:00"),
            ],
            students(&["S1"]),
            lenient(),
        );

        f.coordinator.register_courses(&sid("S1"), &[code("EE250")]).unwrap();
        let result = f.coordinator.register_courses(&sid("S1"), &[code("EE201")]);

        assert_eq!(
            result,
            Err(RegistrationError::Validation(ValidationError::ScheduleConflict {
                first: code("EE201"),
                second: code("EE250"),
                day: chrono::Weekday::Mon,
            }))
        );
    }

    #[test]
    fn test_credit_minimum_enforced() {
        let f = fixture(
            vec![
                course("EE250", 4, 10, "Sun", "08:00", "09:00"),
                course("EE201", 3, 10, "Mon", "08:00", "09:00"),
                course("EE300", 3, 10, "Tue", "08:00", "09:00"),
            ],
            students(&["S1"]),
            RegistrationPolicy::default(),
        );

        let result = f.coordinator.register_courses(
            &sid("S1"),
            &[code("EE250"), code("EE201"), code("EE300")],
        );
        assert_eq!(
            result,
            Err(RegistrationError::Validation(ValidationError::CreditsOutOfRange {
                total: 10,
                min: 12,
                max: 18,
            }))
        );
    }

    #[test]
    fn test_unknown_student_and_course() {
        let f = fixture(
            vec![course("EE250", 4, 10, "Mon", "10:00", "11:20")],
            students(&["S1"]),
            lenient(),
        );

        assert_eq!(
            f.coordinator.register_courses(&sid("nobody"), &[code("EE250")]),
            Err(RegistrationError::UnknownStudent(sid("nobody")))
        );
        assert_eq!(
            f.coordinator.drop_course(&sid("S1"), &code("EE999")),
            Err(RegistrationError::UnknownCourse(code("EE999")))
        );
        assert_eq!(
            f.coordinator.register_courses(&sid("S1"), &[code("EE999")]),
            Err(RegistrationError::Validation(ValidationError::UnknownCourse(code("EE999"))))
        );
    }

    #[test]
    fn test_drop_without_registration() {
        let f = fixture(
            vec![course("EE250", 4, 10, "Mon", "10:00", "11:20")],
            students(&["S1"]),
            lenient(),
        );

        assert_eq!(
            f.coordinator.drop_course(&sid("S1"), &code("EE250")),
            Err(RegistrationError::NotRegistered {
                student: sid("S1"),
                course: code("EE250"),
            })
        );
    }

    #[test]
    fn test_withdraw_from_waitlist() {
        let f = fixture(
            vec![course("EE250", 4, 1, "Mon", "10:00", "11:20")],
            students(&["S1", "S2"]),
            lenient(),
        );
        let ee250 = code("EE250");

        f.coordinator.register_courses(&sid("S1"), &[ee250.clone()]).unwrap();
        f.coordinator.register_courses(&sid("S2"), &[ee250.clone()]).unwrap();
        f.coordinator.withdraw_from_waitlist(&sid("S2"), &ee250).unwrap();

        assert!(matches!(
            f.coordinator.get_waitlist_position(&sid("S2"), &ee250),
            Err(RegistrationError::NotWaitlisted { .. })
        ));
        let dropped = f.coordinator.drop_course(&sid("S1"), &ee250).unwrap();
        assert_eq!(dropped.promoted, None);
    }

    #[test]
    fn test_validate_registration_by_value() {
        let f = fixture(
            vec![
                course("EE250", 4, 40, "Sun", "08:00", "09:00"),
                course("EE301", 3, 40, "Mon", "10:00", "11:20").with_prerequisites(["EE250"]),
            ],
            Vec::new(),
            lenient(),
        );
        let completed = BTreeSet::from([code("EE250")]);
        let enrollments = HashMap::from([(code("EE301"), 40)]);

        let report = f
            .coordinator
            .validate_registration(&[code("EE301")], &completed, "Computer", 3, &enrollments)
            .unwrap();
        assert_eq!(report.full, vec![code("EE301")]);

        let result = f.coordinator.validate_registration(
            &[code("EE301")],
            &BTreeSet::new(),
            "Computer",
            3,
            &HashMap::new(),
        );
        assert_eq!(
            result,
            Err(RegistrationError::Validation(ValidationError::PrerequisiteMissing {
                course: code("EE301"),
                missing: code("EE250"),
            }))
        );
    }

    #[test]
    fn test_timetable_and_status() {
        let f = fixture(
            vec![
                course("EE250", 4, 2, "Sun/Tue", "10:00", "11:20"),
                course("EE201", 3, 40, "Tue", "08:00", "09:20"),
            ],
            students(&["S1"]),
            lenient(),
        );

        f.coordinator
            .register_courses(&sid("S1"), &[code("EE250"), code("EE201")])
            .unwrap();

        let timetable = f.coordinator.timetable(&sid("S1")).unwrap();
        let tuesday = timetable.day(chrono::Weekday::Tue);
        assert_eq!(tuesday.len(), 2);
        assert_eq!(tuesday[0].course, code("EE201"));

        let status = f.coordinator.course_status(&code("EE250")).unwrap();
        assert_eq!(status.enrolled, 1);
        assert_eq!(status.waitlisted, 0);
        assert_eq!(status.course.capacity, 2);
    }

    /// Catalog view that runs `hook` once right after the program plan is
    /// read, the last catalog read before seats are taken.
    struct InterleavingCatalog {
        inner: Arc<InMemoryCatalog>,
        hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl CourseCatalog for InterleavingCatalog {
        fn course(&self, code: &CourseCode) -> Result<Option<Course>, StorageError> {
            self.inner.course(code)
        }

        fn courses(&self) -> Result<Vec<Course>, StorageError> {
            self.inner.courses()
        }

        fn program_plan(
            &self,
            program: &str,
            level: u32,
        ) -> Result<BTreeSet<CourseCode>, StorageError> {
            self.inner.program_plan(program, level)
        }

        fn program_courses(
            &self,
            program: &str,
        ) -> Result<BTreeSet<CourseCode>, StorageError> {
            let plan = self.inner.program_courses(program);
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            plan
        }
    }

    type TestManager =
        CatalogManager<InMemoryCatalog, InMemoryStudentDirectory, InMemoryRegistrationStore>;

    /// Coordinator that runs `admin` mid-request against a manager sharing
    /// the same stores.
    fn interleaved(
        courses: Vec<Course>,
        ids: &[&str],
        admin: impl FnOnce(&TestManager) + Send + 'static,
    ) -> (
        RegistrationCoordinator<InterleavingCatalog, InMemoryStudentDirectory, InMemoryRegistrationStore>,
        Arc<InMemoryRegistrationStore>,
        Arc<InMemoryCatalog>,
    ) {
        let codes: Vec<CourseCode> = courses.iter().map(|c| c.code.clone()).collect();
        let catalog = Arc::new(InMemoryCatalog::with_courses(courses));
        catalog.add_to_plan("Computer", 1, &codes).unwrap();
        let directory = Arc::new(InMemoryStudentDirectory::with_students(students(ids)));
        let store = Arc::new(InMemoryRegistrationStore::new(catalog.clone(), directory.clone()));

        let manager = CatalogManager::new(catalog.clone(), directory.clone(), store.clone());
        let view = InterleavingCatalog {
            inner: catalog.clone(),
            hook: Mutex::new(Some(Box::new(move || admin(&manager)))),
        };
        let coordinator = RegistrationCoordinator::new(Arc::new(view), directory, store.clone(), lenient());
        (coordinator, store, catalog)
    }

    #[test]
    fn test_capacity_cut_during_registration_is_respected() {
        let ee250 = code("EE250");
        let (coordinator, store, catalog) = interleaved(
            vec![course("EE250", 4, 3, "Mon", "10:00", "11:20")],
            &["S1", "S2", "S3"],
            |manager| {
                let cut = CoursePatch {
                    capacity: Some(2),
                    ..CoursePatch::default()
                };
                manager.update_course(&CourseCode::new("EE250"), &cut).unwrap();
            },
        );
        store.add(&sid("S1"), &ee250).unwrap();
        store.add(&sid("S2"), &ee250).unwrap();

        let outcome = coordinator.register_courses(&sid("S3"), &[ee250.clone()]).unwrap();

        assert!(outcome.registered.is_empty());
        assert_eq!(outcome.waitlisted, vec![ee250.clone()]);
        let capacity = catalog.course(&ee250).unwrap().unwrap().capacity;
        assert_eq!(capacity, 2);
        assert_eq!(store.enrolled_count(&ee250).unwrap(), 2);
    }

    #[test]
    fn test_course_deleted_during_registration_writes_nothing() {
        let ee301 = code("EE301");
        let (coordinator, store, _catalog) = interleaved(
            vec![
                course("EE250", 4, 10, "Mon", "10:00", "11:20"),
                course("EE301", 3, 10, "Tue", "10:00", "11:20"),
            ],
            &["S1"],
            |manager| manager.delete_course(&CourseCode::new("EE301")).unwrap(),
        );

        let result = coordinator.register_courses(&sid("S1"), &[code("EE250"), ee301.clone()]);

        assert!(matches!(
            result,
            Err(RegistrationError::Storage(StorageError::ConstraintViolation(_)))
        ));
        assert!(store.registered_courses(&sid("S1")).unwrap().is_empty());
        assert_eq!(store.enrollment_counts().unwrap().len(), 0);
    }
}
