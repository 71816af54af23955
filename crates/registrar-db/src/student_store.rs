use std::sync::Arc;

use redb::{Database, ReadableTable};

use registrar_core::{StorageError, Student, StudentDirectory, StudentId};

use crate::tables::{db_err, STUDENTS_TABLE};

/// redb implementation of StudentDirectory.
pub struct RedbStudentDirectory {
    db: Arc<Database>,
}

impl RedbStudentDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            let _ = write_txn.open_table(STUDENTS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn write(&self, student: &Student, must_exist: bool) -> Result<bool, StorageError> {
        let value = serde_json::to_vec(student).map_err(db_err)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(STUDENTS_TABLE).map_err(db_err)?;
            let exists = table.get(student.id.as_str()).map_err(db_err)?.is_some();
            if exists != must_exist {
                return Ok(false);
            }
            table
                .insert(student.id.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        Ok(true)
    }
}

impl StudentDirectory for RedbStudentDirectory {
    fn student(&self, id: &StudentId) -> Result<Option<Student>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(STUDENTS_TABLE).map_err(db_err)?;

        match table.get(id.as_str()).map_err(db_err)? {
            Some(value) => {
                let student: Student = serde_json::from_slice(value.value()).map_err(db_err)?;
                Ok(Some(student))
            }
            None => Ok(None),
        }
    }

    fn insert_student(&self, student: Student) -> Result<bool, StorageError> {
        self.write(&student, false)
    }

    fn replace_student(&self, student: Student) -> Result<bool, StorageError> {
        self.write(&student, true)
    }

    fn delete_student(&self, id: &StudentId) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = write_txn.open_table(STUDENTS_TABLE).map_err(db_err)?;
            let removed = table.remove(id.as_str()).map_err(db_err)?.is_some();
            removed
        };
        write_txn.commit().map_err(db_err)?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_core::CourseCode;
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, Arc<Database>) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        RedbStudentDirectory::init_tables(&db).unwrap();
        (dir, Arc::new(db))
    }

    #[test]
    fn test_insert_and_get() {
        let (_dir, db) = create_test_db();
        let students = RedbStudentDirectory::new(db);

        let alice = Student::new("S1", "Alice", "Computer", 2).with_completed(["EE250"]);
        assert!(students.insert_student(alice.clone()).unwrap());
        assert!(!students.insert_student(alice.clone()).unwrap());

        let loaded = students.student(&StudentId::new("S1")).unwrap().unwrap();
        assert_eq!(loaded, alice);
        assert!(loaded.has_completed(&CourseCode::new("EE250")));
        assert!(students.student(&StudentId::new("S2")).unwrap().is_none());
    }

    #[test]
    fn test_replace_requires_existing() {
        let (_dir, db) = create_test_db();
        let students = RedbStudentDirectory::new(db);

        let bob = Student::new("S2", "Bob", "Power", 1);
        assert!(!students.replace_student(bob.clone()).unwrap());

        students.insert_student(bob.clone()).unwrap();
        let promoted = Student { level: 2, ..bob };
        assert!(students.replace_student(promoted).unwrap());
        assert_eq!(
            students.student(&StudentId::new("S2")).unwrap().unwrap().level,
            2
        );
    }

    #[test]
    fn test_delete_student() {
        let (_dir, db) = create_test_db();
        let students = RedbStudentDirectory::new(db);

        students
            .insert_student(Student::new("S3", "Cara", "Computer", 1))
            .unwrap();
        assert!(students.delete_student(&StudentId::new("S3")).unwrap());
        assert!(!students.delete_student(&StudentId::new("S3")).unwrap());
        assert!(students.student(&StudentId::new("S3")).unwrap().is_none());
    }
}
