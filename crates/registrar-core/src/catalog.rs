use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::course::{Course, CoursePatch, TimeSlot};
use crate::error::CatalogError;
use crate::ids::{CourseCode, StudentId};
use crate::storage::{
    CatalogStore, CourseRetirement, CourseRevision, RegistrationStore, StudentDirectory,
    StudentRemoval,
};
use crate::student::Student;

/// Result of patching a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseUpdate {
    pub course: Course,
    /// Waitlisted students moved into seats opened by a capacity increase.
    pub promoted: Vec<StudentId>,
}

/// Catalog administration.
///
/// Field and graph invariants are checked here; rules that depend on
/// enrollment are checked by `RegistrationStore` in the same atomic unit as
/// the write. Writes made through one manager are serialized, so
/// read-modify-write edits never interleave. Run one manager per store.
pub struct CatalogManager<C, D, R>
where
    C: CatalogStore,
    D: StudentDirectory,
    R: RegistrationStore,
{
    catalog: Arc<C>,
    students: Arc<D>,
    registrations: Arc<R>,
    admin: Mutex<()>,
}

impl<C, D, R> CatalogManager<C, D, R>
where
    C: CatalogStore,
    D: StudentDirectory,
    R: RegistrationStore,
{
    pub fn new(catalog: Arc<C>, students: Arc<D>, registrations: Arc<R>) -> Self {
        Self {
            catalog,
            students,
            registrations,
            admin: Mutex::new(()),
        }
    }

    pub fn courses(&self) -> Result<Vec<Course>, CatalogError> {
        Ok(self.catalog.courses()?)
    }

    pub fn course(&self, code: &CourseCode) -> Result<Course, CatalogError> {
        self.catalog
            .course(code)?
            .ok_or_else(|| CatalogError::CourseNotFound(code.clone()))
    }

    pub fn add_course(&self, course: Course) -> Result<Course, CatalogError> {
        Self::validate_course(&course)?;
        let _admin = self.admin.lock();
        if course.prerequisites.contains(&course.code) {
            return Err(CatalogError::PrerequisiteCycle {
                course: course.code.clone(),
                prerequisite: course.code.clone(),
            });
        }
        for prerequisite in &course.prerequisites {
            if self.catalog.course(prerequisite)?.is_none() {
                return Err(CatalogError::PrerequisiteNotFound(prerequisite.clone()));
            }
        }

        if !self.catalog.insert_course(course.clone())? {
            return Err(CatalogError::CourseExists(course.code));
        }
        tracing::info!("Added course {}", course.code);
        Ok(course)
    }

    /// Apply a patch. Lowering capacity below the current enrollment is
    /// refused; raising it promotes waitlisted students into the new seats.
    pub fn update_course(
        &self,
        code: &CourseCode,
        patch: &CoursePatch,
    ) -> Result<CourseUpdate, CatalogError> {
        let _admin = self.admin.lock();
        let patched = patch.apply(&self.course(code)?);
        Self::validate_course(&patched)?;

        match self.registrations.revise_course(patched.clone())? {
            CourseRevision::NotFound => Err(CatalogError::CourseNotFound(code.clone())),
            CourseRevision::BelowEnrollment { enrolled } => {
                Err(CatalogError::CapacityBelowEnrollment {
                    course: code.clone(),
                    capacity: patched.capacity,
                    enrolled,
                })
            }
            CourseRevision::Revised { promoted } => {
                tracing::info!("Updated course {}", code);
                for student in &promoted {
                    tracing::info!("Promoted {} into {} after capacity change", student, code);
                }
                Ok(CourseUpdate {
                    course: patched,
                    promoted,
                })
            }
        }
    }

    /// Delete a course nobody is registered or waiting for.
    pub fn delete_course(&self, code: &CourseCode) -> Result<(), CatalogError> {
        let _admin = self.admin.lock();
        match self.registrations.retire_course(code)? {
            CourseRetirement::NotFound => Err(CatalogError::CourseNotFound(code.clone())),
            CourseRetirement::InUse => Err(CatalogError::CourseInUse(code.clone())),
            CourseRetirement::Retired => {
                tracing::info!("Deleted course {}", code);
                Ok(())
            }
        }
    }

    pub fn add_prerequisite(
        &self,
        code: &CourseCode,
        prerequisite: &CourseCode,
    ) -> Result<Course, CatalogError> {
        let _admin = self.admin.lock();
        let mut course = self.course(code)?;
        if self.catalog.course(prerequisite)?.is_none() {
            return Err(CatalogError::PrerequisiteNotFound(prerequisite.clone()));
        }
        if code == prerequisite || self.requires(prerequisite, code)? {
            return Err(CatalogError::PrerequisiteCycle {
                course: code.clone(),
                prerequisite: prerequisite.clone(),
            });
        }

        if course.prerequisites.insert(prerequisite.clone()) {
            self.catalog.replace_course(course.clone())?;
            tracing::info!("Added prerequisite {} to {}", prerequisite, code);
        }
        Ok(course)
    }

    pub fn remove_prerequisite(
        &self,
        code: &CourseCode,
        prerequisite: &CourseCode,
    ) -> Result<Course, CatalogError> {
        let _admin = self.admin.lock();
        let mut course = self.course(code)?;
        if !course.prerequisites.remove(prerequisite) {
            return Err(CatalogError::PrerequisiteNotFound(prerequisite.clone()));
        }
        self.catalog.replace_course(course.clone())?;
        tracing::info!("Removed prerequisite {} from {}", prerequisite, code);
        Ok(course)
    }

    pub fn assign_to_plan(
        &self,
        program: &str,
        level: u32,
        courses: &[CourseCode],
    ) -> Result<BTreeSet<CourseCode>, CatalogError> {
        if program.trim().is_empty() {
            return Err(CatalogError::InvalidPlan("program cannot be empty".to_string()));
        }
        if courses.is_empty() {
            return Err(CatalogError::InvalidPlan("no courses given".to_string()));
        }
        let _admin = self.admin.lock();
        for code in courses {
            self.course(code)?;
        }

        self.catalog.add_to_plan(program, level, courses)?;
        tracing::info!(
            "Assigned {} course(s) to {} level {}",
            courses.len(),
            program,
            level
        );
        self.program_plan(program, level)
    }

    pub fn remove_from_plan(
        &self,
        program: &str,
        level: u32,
        code: &CourseCode,
    ) -> Result<(), CatalogError> {
        let _admin = self.admin.lock();
        if !self.catalog.remove_from_plan(program, level, code)? {
            return Err(CatalogError::InvalidPlan(format!(
                "{} is not in {} level {}",
                code, program, level
            )));
        }
        tracing::info!("Removed {} from {} level {}", code, program, level);
        Ok(())
    }

    pub fn program_plan(
        &self,
        program: &str,
        level: u32,
    ) -> Result<BTreeSet<CourseCode>, CatalogError> {
        Ok(self.catalog.program_plan(program, level)?)
    }

    pub fn add_student(&self, student: Student) -> Result<Student, CatalogError> {
        if student.id.as_str().trim().is_empty() {
            return Err(CatalogError::InvalidStudent("id cannot be empty".to_string()));
        }
        if student.program.trim().is_empty() {
            return Err(CatalogError::InvalidStudent(
                "program cannot be empty".to_string(),
            ));
        }

        let _admin = self.admin.lock();
        if !self.students.insert_student(student.clone())? {
            return Err(CatalogError::StudentExists(student.id));
        }
        tracing::info!("Added student {}", student.id);
        Ok(student)
    }

    pub fn student(&self, id: &StudentId) -> Result<Student, CatalogError> {
        self.students
            .student(id)?
            .ok_or_else(|| CatalogError::StudentNotFound(id.clone()))
    }

    /// Delete a student. Their seats go to the next waitlisted students and
    /// their waitlist entries are dropped, together with the record.
    pub fn delete_student(&self, id: &StudentId) -> Result<StudentRemoval, CatalogError> {
        let _admin = self.admin.lock();
        let removal = self
            .registrations
            .remove_student(id)?
            .ok_or_else(|| CatalogError::StudentNotFound(id.clone()))?;

        tracing::info!(
            "Deleted student {}: released {} seat(s), left {} waitlist(s)",
            id,
            removal.released.len(),
            removal.withdrawn.len()
        );
        for seat in &removal.released {
            if let Some(next) = &seat.promoted {
                tracing::info!("Promoted {} into {} from waitlist", next, seat.course);
            }
        }
        Ok(removal)
    }

    /// Mark a course as completed. Recording it twice is a no-op.
    pub fn record_completion(
        &self,
        id: &StudentId,
        course: &CourseCode,
    ) -> Result<Student, CatalogError> {
        let _admin = self.admin.lock();
        let mut student = self.student(id)?;
        self.course(course)?;

        if student.completed.insert(course.clone()) {
            if !self.students.replace_student(student.clone())? {
                return Err(CatalogError::StudentNotFound(id.clone()));
            }
            tracing::info!("Recorded completion of {} for {}", course, id);
        }
        Ok(student)
    }

    /// Whether `from` depends on `target` through the prerequisite graph.
    fn requires(&self, from: &CourseCode, target: &CourseCode) -> Result<bool, CatalogError> {
        let mut stack = vec![from.clone()];
        let mut seen = HashSet::new();

        while let Some(code) = stack.pop() {
            if &code == target {
                return Ok(true);
            }
            if !seen.insert(code.clone()) {
                continue;
            }
            if let Some(course) = self.catalog.course(&code)? {
                stack.extend(course.prerequisites.into_iter());
            }
        }
        Ok(false)
    }

    /// Validate the fields of a course.
    pub fn validate_course(course: &Course) -> Result<(), CatalogError> {
        if course.code.as_str().trim().is_empty() {
            return Err(CatalogError::InvalidCourse("code cannot be empty".to_string()));
        }
        if course.name.trim().is_empty() {
            return Err(CatalogError::InvalidCourse("name cannot be empty".to_string()));
        }
        if course.room.trim().is_empty() {
            return Err(CatalogError::InvalidCourse("room cannot be empty".to_string()));
        }
        if course.credits == 0 {
            return Err(CatalogError::InvalidCourse(
                "credits must be positive".to_string(),
            ));
        }
        if course.capacity == 0 {
            return Err(CatalogError::InvalidCourse(
                "capacity must be positive".to_string(),
            ));
        }
        if course.schedule.is_empty() {
            return Err(CatalogError::InvalidCourse(
                "schedule needs at least one time slot".to_string(),
            ));
        }
        course.schedule.iter().try_for_each(Self::validate_slot)
    }

    pub fn validate_slot(slot: &TimeSlot) -> Result<(), CatalogError> {
        if slot.days.is_empty() {
            return Err(CatalogError::InvalidCourse(
                "time slot has no days".to_string(),
            ));
        }
        if slot.end <= slot.start {
            return Err(CatalogError::InvalidCourse(format!(
                "time slot ends at {} before it starts at {}",
                slot.end.format("%H:%M"),
                slot.start.format("%H:%M")
            )));
        }
        Ok(())
    }
}
