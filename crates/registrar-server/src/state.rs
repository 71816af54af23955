use std::path::Path;
use std::sync::Arc;

use registrar_core::{
    CatalogManager, RegistrationCoordinator, RegistrationPolicy, RequestClock, StorageError,
    WaitlistQueue,
};
use registrar_db::{init_database, RedbCatalog, RedbRegistrationStore, RedbStudentDirectory};

pub type Coordinator =
    RegistrationCoordinator<RedbCatalog, RedbStudentDirectory, RedbRegistrationStore>;
pub type Catalog = CatalogManager<RedbCatalog, RedbStudentDirectory, RedbRegistrationStore>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Open the database at `path` and wire the stores into the engine.
    pub fn open(path: impl AsRef<Path>, policy: RegistrationPolicy) -> Result<Self, StorageError> {
        let db = init_database(path)?;

        let courses = Arc::new(RedbCatalog::new(db.clone()));
        let students = Arc::new(RedbStudentDirectory::new(db.clone()));
        let registrations = Arc::new(RedbRegistrationStore::new(db));

        // Stamps must stay ahead of waitlist entries written by earlier runs.
        let clock = match registrations.latest_stamp()? {
            Some(last) => RequestClock::resume_from(last),
            None => RequestClock::new(),
        };

        let coordinator = RegistrationCoordinator::new(
            courses.clone(),
            students.clone(),
            registrations.clone(),
            policy,
        )
        .with_clock(clock);
        let catalog = CatalogManager::new(courses, students, registrations);

        Ok(Self {
            coordinator: Arc::new(coordinator),
            catalog: Arc::new(catalog),
        })
    }
}
