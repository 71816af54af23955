use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::course::Course;
use crate::error::ValidationError;
use crate::ids::CourseCode;
use crate::policy::RegistrationPolicy;

/// Everything the validator needs to decide on one request. Built by the
/// caller from current state; the validator never touches storage.
#[derive(Debug, Clone, Default)]
pub struct RegistrationSnapshot {
    /// Requested course codes, in request order.
    pub selected: Vec<CourseCode>,
    /// Catalog entries for the selected and already-registered courses.
    /// A selected code missing here does not exist.
    pub courses: HashMap<CourseCode, Course>,
    pub completed: BTreeSet<CourseCode>,
    pub program: String,
    /// Informational. Plan membership is checked against `plan_courses`,
    /// which spans every level of the program.
    pub level: u32,
    /// Union of the program's plan across all levels.
    pub plan_courses: BTreeSet<CourseCode>,
    /// Current enrolled count per course.
    pub enrollments: HashMap<CourseCode, u32>,
    /// Courses the student already holds this term.
    pub registered: Vec<CourseCode>,
}

/// Summary of an admissible request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    /// Term credits including already-registered courses.
    pub total_credits: u32,
    /// Selected courses that are full in the snapshot and would be waitlisted.
    pub full: Vec<CourseCode>,
}

/// Registration validator.
///
/// Checks run in a fixed order and stop at the first violation:
/// structure, existence and prerequisites, credit bounds, program plan,
/// schedule conflicts. Capacity is not a rejection reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    policy: RegistrationPolicy,
}

impl Validator {
    pub fn new(policy: RegistrationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Validate a complete request.
    pub fn validate(
        &self,
        snapshot: &RegistrationSnapshot,
    ) -> Result<ValidationReport, ValidationError> {
        Self::check_structure(&snapshot.selected)?;
        let selected =
            Self::check_prerequisites(&snapshot.selected, &snapshot.courses, &snapshot.completed)?;
        let existing: Vec<&Course> = snapshot
            .registered
            .iter()
            .filter_map(|code| snapshot.courses.get(code))
            .collect();
        let total_credits = self.check_credit_hours(&selected, &existing)?;
        Self::check_program_plan(&selected, &snapshot.program, &snapshot.plan_courses)?;
        Self::check_schedule_conflicts(&selected, &existing)?;

        let full = selected
            .iter()
            .filter(|c| snapshot.enrollments.get(&c.code).copied().unwrap_or(0) >= c.capacity)
            .map(|c| c.code.clone())
            .collect();

        Ok(ValidationReport {
            total_credits,
            full,
        })
    }

    /// Selection must be non-empty and free of repeats.
    pub fn check_structure(selected: &[CourseCode]) -> Result<(), ValidationError> {
        if selected.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        let mut seen = HashSet::with_capacity(selected.len());
        for code in selected {
            if !seen.insert(code) {
                return Err(ValidationError::DuplicateSelection(code.clone()));
            }
        }
        Ok(())
    }

    /// Every selected course must exist and have its prerequisites completed.
    /// Returns the resolved courses in selection order.
    pub fn check_prerequisites<'a>(
        selected: &[CourseCode],
        courses: &'a HashMap<CourseCode, Course>,
        completed: &BTreeSet<CourseCode>,
    ) -> Result<Vec<&'a Course>, ValidationError> {
        let mut resolved = Vec::with_capacity(selected.len());
        for code in selected {
            let course = courses
                .get(code)
                .ok_or_else(|| ValidationError::UnknownCourse(code.clone()))?;
            if let Some(missing) = course.prerequisites.iter().find(|p| !completed.contains(*p)) {
                return Err(ValidationError::PrerequisiteMissing {
                    course: code.clone(),
                    missing: missing.clone(),
                });
            }
            resolved.push(course);
        }
        Ok(resolved)
    }

    /// Term total must lie within the policy bounds. Returns the total.
    pub fn check_credit_hours(
        &self,
        selected: &[&Course],
        existing: &[&Course],
    ) -> Result<u32, ValidationError> {
        let total: u32 = selected
            .iter()
            .chain(existing.iter())
            .map(|c| c.credits)
            .sum();
        if !self.policy.admits(total) {
            return Err(ValidationError::CreditsOutOfRange {
                total,
                min: self.policy.min_credits,
                max: self.policy.max_credits,
            });
        }
        Ok(total)
    }

    /// Courses must belong to the student's program at any level.
    pub fn check_program_plan(
        selected: &[&Course],
        program: &str,
        plan_courses: &BTreeSet<CourseCode>,
    ) -> Result<(), ValidationError> {
        match selected.iter().find(|c| !plan_courses.contains(&c.code)) {
            Some(course) => Err(ValidationError::NotInProgramPlan {
                course: course.code.clone(),
                program: program.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// No two selected courses may overlap, and no selected course may
    /// overlap one already registered.
    pub fn check_schedule_conflicts(
        selected: &[&Course],
        existing: &[&Course],
    ) -> Result<(), ValidationError> {
        for (i, first) in selected.iter().enumerate() {
            for second in selected[i + 1..].iter().chain(existing.iter()) {
                if let Some(day) = first.conflicts_with(second) {
                    return Err(ValidationError::ScheduleConflict {
                        first: first.code.clone(),
                        second: second.code.clone(),
                        day,
                    });
                }
            }
        }
        Ok(())
    }
}
