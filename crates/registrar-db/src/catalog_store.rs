use std::collections::BTreeSet;
use std::sync::Arc;

use redb::{Database, ReadableTable, Table};

use registrar_core::{CatalogStore, Course, CourseCatalog, CourseCode, StorageError};

use crate::tables::{db_err, COURSES_TABLE, PROGRAM_PLANS_TABLE};

/// redb implementation of CatalogStore.
pub struct RedbCatalog {
    db: Arc<Database>,
}

impl RedbCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(COURSES_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

pub(crate) fn decode_course(bytes: &[u8]) -> Result<Course, StorageError> {
    serde_json::from_slice(bytes).map_err(db_err)
}

fn decode_plan(bytes: &[u8]) -> Result<BTreeSet<CourseCode>, StorageError> {
    serde_json::from_slice(bytes).map_err(db_err)
}

/// Remove a course and every reference to it from prerequisites and plans,
/// inside the caller's write transaction. Returns Ok(false) if it does not exist.
pub(crate) fn strip_course(
    courses: &mut Table<'_, &'static str, &'static [u8]>,
    plans: &mut Table<'_, (&'static str, u32), &'static [u8]>,
    code: &CourseCode,
) -> Result<bool, StorageError> {
    if courses.remove(code.as_str()).map_err(db_err)?.is_none() {
        return Ok(false);
    }

    let mut dependents = Vec::new();
    for entry in courses.iter().map_err(db_err)? {
        let (_, value) = entry.map_err(db_err)?;
        let course = decode_course(value.value())?;
        if course.prerequisites.contains(code) {
            dependents.push(course);
        }
    }
    for mut course in dependents {
        course.prerequisites.remove(code);
        let value = serde_json::to_vec(&course).map_err(db_err)?;
        courses
            .insert(course.code.as_str(), value.as_slice())
            .map_err(db_err)?;
    }

    let mut affected = Vec::new();
    for entry in plans.iter().map_err(db_err)? {
        let (key, value) = entry.map_err(db_err)?;
        let mut plan = decode_plan(value.value())?;
        if plan.remove(code) {
            let (program, level) = key.value();
            affected.push((program.to_string(), level, plan));
        }
    }
    for (program, level, plan) in affected {
        let value = serde_json::to_vec(&plan).map_err(db_err)?;
        plans
            .insert((program.as_str(), level), value.as_slice())
            .map_err(db_err)?;
    }
    Ok(true)
}

impl CourseCatalog for RedbCatalog {
    fn course(&self, code: &CourseCode) -> Result<Option<Course>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(COURSES_TABLE).map_err(db_err)?;

        match table.get(code.as_str()).map_err(db_err)? {
            Some(value) => Ok(Some(decode_course(value.value())?)),
            None => Ok(None),
        }
    }

    fn courses(&self) -> Result<Vec<Course>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(COURSES_TABLE).map_err(db_err)?;

        let mut courses = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            courses.push(decode_course(value.value())?);
        }
        Ok(courses)
    }

    fn program_plan(
        &self,
        program: &str,
        level: u32,
    ) -> Result<BTreeSet<CourseCode>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;

        match table.get((program, level)).map_err(db_err)? {
            Some(value) => decode_plan(value.value()),
            None => Ok(BTreeSet::new()),
        }
    }

    fn program_courses(&self, program: &str) -> Result<BTreeSet<CourseCode>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;

        let start: (&str, u32) = (program, 0);
        let mut courses = BTreeSet::new();
        for entry in table.range(start..).map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            if key.value().0 != program {
                break;
            }
            courses.extend(decode_plan(value.value())?);
        }
        Ok(courses)
    }
}

impl CatalogStore for RedbCatalog {
    fn insert_course(&self, course: Course) -> Result<bool, StorageError> {
        let value = serde_json::to_vec(&course).map_err(db_err)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(COURSES_TABLE).map_err(db_err)?;
            if table.get(course.code.as_str()).map_err(db_err)?.is_some() {
                return Ok(false);
            }
            table
                .insert(course.code.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }

    fn replace_course(&self, course: Course) -> Result<bool, StorageError> {
        let value = serde_json::to_vec(&course).map_err(db_err)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(COURSES_TABLE).map_err(db_err)?;
            if table.get(course.code.as_str()).map_err(db_err)?.is_none() {
                return Ok(false);
            }
            table
                .insert(course.code.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }

    fn delete_course(&self, code: &CourseCode) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let deleted = {
            let mut courses = write_txn.open_table(COURSES_TABLE).map_err(db_err)?;
            let mut plans = write_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;
            strip_course(&mut courses, &mut plans, code)?
        };
        if !deleted {
            return Ok(false);
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }

    fn add_to_plan(
        &self,
        program: &str,
        level: u32,
        courses: &[CourseCode],
    ) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;
            let mut plan = match table.get((program, level)).map_err(db_err)? {
                Some(value) => decode_plan(value.value())?,
                None => BTreeSet::new(),
            };
            plan.extend(courses.iter().cloned());

            let value = serde_json::to_vec(&plan).map_err(db_err)?;
            table
                .insert((program, level), value.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(())
    }

    fn remove_from_plan(
        &self,
        program: &str,
        level: u32,
        course: &CourseCode,
    ) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(PROGRAM_PLANS_TABLE).map_err(db_err)?;
            let mut plan = match table.get((program, level)).map_err(db_err)? {
                Some(value) => decode_plan(value.value())?,
                None => return Ok(false),
            };
            if !plan.remove(course) {
                return Ok(false);
            }

            if plan.is_empty() {
                table.remove((program, level)).map_err(db_err)?;
            } else {
                let value = serde_json::to_vec(&plan).map_err(db_err)?;
                table
                    .insert((program, level), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }
}
