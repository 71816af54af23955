//! Registrar DB - redb implementation of storage traits.

pub mod catalog_store;
pub mod registration_store;
pub mod student_store;
pub mod tables;

pub use catalog_store::RedbCatalog;
pub use registration_store::RedbRegistrationStore;
pub use student_store::RedbStudentDirectory;

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use registrar_core::StorageError;

use crate::tables::db_err;

/// Open or create a database with all required tables.
pub fn init_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StorageError> {
    let db = Database::create(path).map_err(db_err)?;

    RedbCatalog::init_tables(&db)?;
    RedbStudentDirectory::init_tables(&db)?;
    RedbRegistrationStore::init_tables(&db)?;

    tracing::debug!("Database tables initialized");
    Ok(Arc::new(db))
}
