use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{CourseCode, StudentId};

/// A student as seen by the registration engine.
///
/// `completed` is derived from the transcript; grades are not tracked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub program: String,
    pub level: u32,
    #[serde(default)]
    pub completed: BTreeSet<CourseCode>,
}

impl Student {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        program: impl Into<String>,
        level: u32,
    ) -> Self {
        Self {
            id: StudentId::new(id),
            name: name.into(),
            program: program.into(),
            level,
            completed: BTreeSet::new(),
        }
    }

    pub fn with_completed<I, S>(mut self, courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed
            .extend(courses.into_iter().map(|c| CourseCode::new(c)));
        self
    }

    pub fn has_completed(&self, course: &CourseCode) -> bool {
        self.completed.contains(course)
    }
}
