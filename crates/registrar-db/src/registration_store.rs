use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use redb::{Database, ReadableTable, Table, WriteTransaction};

use registrar_core::{
    Admission, Course, CourseCode, CourseRetirement, CourseRevision, EnrollmentLedger,
    RegistrationStore, ReleasedSeat, RequestStamp, SeatRelease, StorageError, StudentId,
    StudentRemoval, WaitlistEntry, WaitlistQueue,
};

use crate::catalog_store::{decode_course, strip_course};
use crate::tables::{
    db_err, WaitlistKey, COURSES_TABLE, ENROLLED_COUNTS_TABLE, PROGRAM_PLANS_TABLE,
    REGISTRATIONS_TABLE, STUDENTS_TABLE, STUDENT_REGISTRATIONS_TABLE, WAITLIST_INDEX_TABLE,
    WAITLIST_SEQUENCE_TABLE, WAITLIST_TABLE,
};

/// redb implementation of RegistrationStore.
///
/// Every compound operation runs in a single write transaction that also
/// reads the course and student records it depends on. redb admits one
/// writer at a time, so a capacity or existence check cannot go stale before
/// the write commits.
pub struct RedbRegistrationStore {
    db: Arc<Database>,
}

impl RedbRegistrationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            // Create tables if they don't exist
            let _ = WriteTables::open(&write_txn)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Run `f` against the tables in one write transaction. The transaction
    /// is committed only if `f` succeeds.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteTables<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let result = {
            let mut tables = WriteTables::open(&write_txn)?;
            f(&mut tables)?
        };
        write_txn.commit().map_err(db_err)?;
        Ok(result)
    }
}

fn enrolled<T>(counts: &T, course: &str) -> Result<u32, StorageError>
where
    T: ReadableTable<&'static str, u32>,
{
    Ok(counts
        .get(course)
        .map_err(db_err)?
        .map(|v| v.value())
        .unwrap_or(0))
}

/// Entries for one course in key order, which is promotion order.
fn queued<T>(waitlist: &T, course: &str) -> Result<Vec<WaitlistEntry>, StorageError>
where
    T: ReadableTable<WaitlistKey, &'static str>,
{
    let start: (&str, u64, u32, u64) = (course, 0, 0, 0);
    let mut entries = Vec::new();
    for entry in waitlist.range(start..).map_err(db_err)? {
        let (key, value) = entry.map_err(db_err)?;
        let (key_course, wall_ms, seq, _) = key.value();
        if key_course != course {
            break;
        }
        entries.push(WaitlistEntry {
            student: StudentId::new(value.value()),
            course: CourseCode::new(key_course),
            stamp: RequestStamp::new(wall_ms, seq),
        });
    }
    Ok(entries)
}

fn rank(entries: &[WaitlistEntry], student: &str) -> Option<usize> {
    entries
        .iter()
        .position(|e| e.student.as_str() == student)
        .map(|idx| idx + 1)
}

fn duplicate(student: &str, course: &str) -> StorageError {
    StorageError::ConstraintViolation(format!(
        "registration ({}, {}) already exists",
        student, course
    ))
}

/// Ledger, waitlist, catalog and student tables opened in one write
/// transaction.
struct WriteTables<'txn> {
    registrations: Table<'txn, (&'static str, &'static str), ()>,
    by_student: Table<'txn, (&'static str, &'static str), ()>,
    counts: Table<'txn, &'static str, u32>,
    waitlist: Table<'txn, WaitlistKey, &'static str>,
    waitlist_index: Table<'txn, (&'static str, &'static str), (u64, u32, u64)>,
    arrivals: Table<'txn, &'static str, u64>,
    courses: Table<'txn, &'static str, &'static [u8]>,
    plans: Table<'txn, (&'static str, u32), &'static [u8]>,
    students: Table<'txn, &'static str, &'static [u8]>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, StorageError> {
        Ok(Self {
            registrations: txn.open_table(REGISTRATIONS_TABLE).map_err(db_err)?,
            by_student: txn.open_table(STUDENT_REGISTRATIONS_TABLE).map_err(db_err)?,
            counts: txn.open_table(ENROLLED_COUNTS_TABLE).map_err(db_err)?,
            waitlist: txn.open_table(WAITLIST_TABLE).map_err(db_err)?,
            waitlist_index: txn.open_table(WAITLIST_INDEX_TABLE).map_err(db_err)?,
            arrivals: txn.open_table(WAITLIST_SEQUENCE_TABLE).map_err(db_err)?,
            courses: txn.open_table(COURSES_TABLE).map_err(db_err)?,
            plans: txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?,
            students: txn.open_table(STUDENTS_TABLE).map_err(db_err)?,
        })
    }

    /// Capacity of the stored course, or None if it does not exist.
    fn capacity(&self, course: &str) -> Result<Option<u32>, StorageError> {
        match self.courses.get(course).map_err(db_err)? {
            Some(value) => Ok(Some(decode_course(value.value())?.capacity)),
            None => Ok(None),
        }
    }

    fn student_exists(&self, student: &str) -> Result<bool, StorageError> {
        Ok(self.students.get(student).map_err(db_err)?.is_some())
    }

    fn is_registered(&self, student: &str, course: &str) -> Result<bool, StorageError> {
        Ok(self
            .registrations
            .get((course, student))
            .map_err(db_err)?
            .is_some())
    }

    fn register(&mut self, student: &str, course: &str) -> Result<(), StorageError> {
        if self
            .registrations
            .insert((course, student), ())
            .map_err(db_err)?
            .is_some()
        {
            return Err(duplicate(student, course));
        }
        self.by_student
            .insert((student, course), ())
            .map_err(db_err)?;

        let count = enrolled(&self.counts, course)?;
        self.counts.insert(course, count + 1).map_err(db_err)?;
        Ok(())
    }

    fn unregister(&mut self, student: &str, course: &str) -> Result<bool, StorageError> {
        if self
            .registrations
            .remove((course, student))
            .map_err(db_err)?
            .is_none()
        {
            return Ok(false);
        }
        self.by_student.remove((student, course)).map_err(db_err)?;

        let count = enrolled(&self.counts, course)?;
        if count <= 1 {
            self.counts.remove(course).map_err(db_err)?;
        } else {
            self.counts.insert(course, count - 1).map_err(db_err)?;
        }
        Ok(true)
    }

    fn enqueue(
        &mut self,
        student: &str,
        course: &str,
        stamp: RequestStamp,
    ) -> Result<bool, StorageError> {
        if self
            .waitlist_index
            .get((course, student))
            .map_err(db_err)?
            .is_some()
        {
            return Ok(false);
        }

        let arrival = self
            .arrivals
            .get(course)
            .map_err(db_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        self.arrivals.insert(course, arrival + 1).map_err(db_err)?;

        self.waitlist
            .insert((course, stamp.wall_ms, stamp.seq, arrival), student)
            .map_err(db_err)?;
        self.waitlist_index
            .insert((course, student), (stamp.wall_ms, stamp.seq, arrival))
            .map_err(db_err)?;
        Ok(true)
    }

    fn withdraw(&mut self, student: &str, course: &str) -> Result<bool, StorageError> {
        let slot = self
            .waitlist_index
            .remove((course, student))
            .map_err(db_err)?
            .map(|v| v.value());

        match slot {
            Some((wall_ms, seq, arrival)) => {
                self.waitlist
                    .remove((course, wall_ms, seq, arrival))
                    .map_err(db_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn dequeue_next(&mut self, course: &str) -> Result<Option<StudentId>, StorageError> {
        let head = queued(&self.waitlist, course)?.into_iter().next();
        match head {
            Some(entry) => {
                self.withdraw(entry.student.as_str(), course)?;
                Ok(Some(entry.student))
            }
            None => Ok(None),
        }
    }

    /// Move the head of the waitlist into a seat if one is open.
    fn promote_next(
        &mut self,
        course: &str,
        capacity: u32,
    ) -> Result<Option<StudentId>, StorageError> {
        if enrolled(&self.counts, course)? >= capacity {
            return Ok(None);
        }
        let next = self.dequeue_next(course)?;
        if let Some(student) = &next {
            self.register(student.as_str(), course)?;
        }
        Ok(next)
    }

    /// Entries that would be promoted before this student.
    fn waiting_ahead(&self, student: &str, course: &str) -> Result<u32, StorageError> {
        let entries = queued(&self.waitlist, course)?;
        Ok(match rank(&entries, student) {
            Some(position) => (position - 1) as u32,
            None => entries.len() as u32,
        })
    }

    fn position(&self, student: &str, course: &str) -> Result<Option<usize>, StorageError> {
        Ok(rank(&queued(&self.waitlist, course)?, student))
    }

    /// Courses the student is waiting for, ordered by code.
    fn waiting_for(&self, student: &str) -> Result<Vec<String>, StorageError> {
        let mut courses = Vec::new();
        for entry in self.waitlist_index.iter().map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            let (course, waiting) = key.value();
            if waiting == student {
                courses.push(course.to_string());
            }
        }
        Ok(courses)
    }

    /// Courses the student holds a seat in, ordered by code.
    fn held_by(&self, student: &str) -> Result<Vec<String>, StorageError> {
        let start: (&str, &str) = (student, "");
        let mut courses = Vec::new();
        for entry in self.by_student.range(start..).map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            let (key_student, course) = key.value();
            if key_student != student {
                break;
            }
            courses.push(course.to_string());
        }
        Ok(courses)
    }
}

impl EnrollmentLedger for RedbRegistrationStore {
    fn enrolled_count(&self, course: &CourseCode) -> Result<u32, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(ENROLLED_COUNTS_TABLE).map_err(db_err)?;
        enrolled(&table, course.as_str())
    }

    fn is_registered(
        &self,
        student: &StudentId,
        course: &CourseCode,
    ) -> Result<bool, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(REGISTRATIONS_TABLE).map_err(db_err)?;

        Ok(table
            .get((course.as_str(), student.as_str()))
            .map_err(db_err)?
            .is_some())
    }

    fn add(&self, student: &StudentId, course: &CourseCode) -> Result<(), StorageError> {
        self.write(|tables| tables.register(student.as_str(), course.as_str()))
    }

    fn remove(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError> {
        self.write(|tables| tables.unregister(student.as_str(), course.as_str()))
    }

    fn registered_courses(&self, student: &StudentId) -> Result<Vec<CourseCode>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn
            .open_table(STUDENT_REGISTRATIONS_TABLE)
            .map_err(db_err)?;

        let start: (&str, &str) = (student.as_str(), "");
        let mut courses = Vec::new();
        for entry in table.range(start..).map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            let (key_student, course) = key.value();
            if key_student != student.as_str() {
                break;
            }
            courses.push(CourseCode::new(course));
        }
        Ok(courses)
    }

    fn enrollment_counts(&self) -> Result<BTreeMap<CourseCode, u32>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(ENROLLED_COUNTS_TABLE).map_err(db_err)?;

        let mut counts = BTreeMap::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            counts.insert(CourseCode::new(key.value()), value.value());
        }
        Ok(counts)
    }
}

impl WaitlistQueue for RedbRegistrationStore {
    fn enqueue(
        &self,
        student: &StudentId,
        course: &CourseCode,
        stamp: RequestStamp,
    ) -> Result<bool, StorageError> {
        self.write(|tables| tables.enqueue(student.as_str(), course.as_str(), stamp))
    }

    fn dequeue_next(&self, course: &CourseCode) -> Result<Option<StudentId>, StorageError> {
        self.write(|tables| tables.dequeue_next(course.as_str()))
    }

    fn position(
        &self,
        student: &StudentId,
        course: &CourseCode,
    ) -> Result<Option<usize>, StorageError> {
        Ok(rank(&self.waitlist(course)?, student.as_str()))
    }

    fn withdraw(&self, student: &StudentId, course: &CourseCode) -> Result<bool, StorageError> {
        self.write(|tables| tables.withdraw(student.as_str(), course.as_str()))
    }

    fn waitlist(&self, course: &CourseCode) -> Result<Vec<WaitlistEntry>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(WAITLIST_TABLE).map_err(db_err)?;
        queued(&table, course.as_str())
    }

    fn latest_stamp(&self) -> Result<Option<RequestStamp>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(WAITLIST_INDEX_TABLE).map_err(db_err)?;

        let mut latest: Option<RequestStamp> = None;
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            let (wall_ms, seq, _) = value.value();
            let stamp = RequestStamp::new(wall_ms, seq);
            if latest.map_or(true, |l| stamp > l) {
                latest = Some(stamp);
            }
        }
        Ok(latest)
    }
}

impl RegistrationStore for RedbRegistrationStore {
    fn admit(
        &self,
        student: &StudentId,
        courses: &[CourseCode],
        stamp: RequestStamp,
    ) -> Result<Vec<Admission>, StorageError> {
        let student = student.as_str();
        self.write(|tables| {
            if !tables.student_exists(student)? {
                return Err(StorageError::ConstraintViolation(format!(
                    "student {} does not exist",
                    student
                )));
            }

            let mut seen = HashSet::with_capacity(courses.len());
            let mut capacities = Vec::with_capacity(courses.len());
            for course in courses {
                let code = course.as_str();
                if !seen.insert(code) || tables.is_registered(student, code)? {
                    return Err(duplicate(student, code));
                }
                let capacity = tables.capacity(code)?.ok_or_else(|| {
                    StorageError::ConstraintViolation(format!("course {} does not exist", code))
                })?;
                capacities.push(capacity);
            }

            let mut admissions = Vec::with_capacity(courses.len());
            for (course, capacity) in courses.iter().zip(capacities) {
                let code = course.as_str();
                let taken = enrolled(&tables.counts, code)? + tables.waiting_ahead(student, code)?;

                if taken < capacity {
                    tables.withdraw(student, code)?;
                    tables.register(student, code)?;
                    admissions.push(Admission::Registered(course.clone()));
                } else {
                    tables.enqueue(student, code, stamp)?;
                    let position = tables.position(student, code)?.unwrap_or(0);
                    admissions.push(Admission::Waitlisted {
                        course: course.clone(),
                        position,
                    });
                }
            }
            Ok(admissions)
        })
    }

    fn release(
        &self,
        student: &StudentId,
        course: &CourseCode,
    ) -> Result<SeatRelease, StorageError> {
        let course = course.as_str();
        self.write(|tables| {
            if !tables.unregister(student.as_str(), course)? {
                return Ok(SeatRelease::NotRegistered);
            }

            let capacity = tables.capacity(course)?.unwrap_or(0);
            let promoted = tables.promote_next(course, capacity)?;
            Ok(SeatRelease::Released { promoted })
        })
    }

    fn revise_course(&self, course: Course) -> Result<CourseRevision, StorageError> {
        let value = serde_json::to_vec(&course).map_err(db_err)?;
        let code = course.code.as_str();
        self.write(|tables| {
            if tables.capacity(code)?.is_none() {
                return Ok(CourseRevision::NotFound);
            }
            let enrolled = enrolled(&tables.counts, code)?;
            if course.capacity < enrolled {
                return Ok(CourseRevision::BelowEnrollment { enrolled });
            }

            tables
                .courses
                .insert(code, value.as_slice())
                .map_err(db_err)?;
            let promoted: Vec<StudentId> = std::iter::from_fn(|| {
                tables.promote_next(code, course.capacity).transpose()
            })
            .collect::<Result<_, _>>()?;
            Ok(CourseRevision::Revised { promoted })
        })
    }

    fn retire_course(&self, code: &CourseCode) -> Result<CourseRetirement, StorageError> {
        self.write(|tables| {
            let course = code.as_str();
            if tables.capacity(course)?.is_none() {
                return Ok(CourseRetirement::NotFound);
            }
            if enrolled(&tables.counts, course)? > 0
                || !queued(&tables.waitlist, course)?.is_empty()
            {
                return Ok(CourseRetirement::InUse);
            }

            strip_course(&mut tables.courses, &mut tables.plans, code)?;
            Ok(CourseRetirement::Retired)
        })
    }

    fn remove_student(
        &self,
        student: &StudentId,
    ) -> Result<Option<StudentRemoval>, StorageError> {
        let id = student.as_str();
        self.write(|tables| {
            let existed = tables.students.remove(id).map_err(db_err)?.is_some();
            if !existed {
                return Ok(None);
            }

            let withdrawn = tables.waiting_for(id)?;
            for course in &withdrawn {
                tables.withdraw(id, course)?;
            }

            let held = tables.held_by(id)?;
            let mut released = Vec::with_capacity(held.len());
            for course in held {
                tables.unregister(id, &course)?;
                let capacity = tables.capacity(&course)?.unwrap_or(0);
                let promoted = tables.promote_next(&course, capacity)?;
                released.push(ReleasedSeat {
                    course: CourseCode::new(course),
                    promoted,
                });
            }

            tracing::debug!(
                "Removed student {} with {} seat(s) and {} waitlist entries",
                id,
                released.len(),
                withdrawn.len()
            );
            Ok(Some(StudentRemoval {
                released,
                withdrawn: withdrawn.into_iter().map(CourseCode::new).collect(),
            }))
        })
    }
}
