use crate::error::{AppError, PersistError};
use crate::models::SavedPlant;
use crate::services::plant_service;
use rusqlite::Connection;
use std::sync::Mutex;
use uuid::Uuid;

/// Persisted-record store for saved plants.
///
/// Calls block the current thread; callers on an async runtime move them to
/// the blocking pool.
pub trait PlantStore: Send + Sync {
    /// Commits a new record atomically
    fn create(&self, plant: &SavedPlant) -> Result<(), PersistError>;

    /// All records, newest first
    fn list(&self) -> Result<Vec<SavedPlant>, PersistError>;

    fn delete(&self, id: &Uuid) -> Result<(), PersistError>;
}

/// SQLite backed store, writes are serialized through one connection
pub struct SqlitePlantStore {
    conn: Mutex<Connection>,
}

impl SqlitePlantStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, PersistError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| PersistError::Other("Database connection poisoned".to_string()))?;
        f(&guard).map_err(to_persist_error)
    }
}

fn to_persist_error(e: AppError) -> PersistError {
    match e {
        AppError::Database(e) => PersistError::Database(e),
        AppError::NotFound(msg) => PersistError::NotFound(msg),
        other => PersistError::Other(other.to_string()),
    }
}

impl PlantStore for SqlitePlantStore {
    fn create(&self, plant: &SavedPlant) -> Result<(), PersistError> {
        self.with_conn(|conn| plant_service::create_plant(conn, plant).map(|_| ()))
    }

    fn list(&self) -> Result<Vec<SavedPlant>, PersistError> {
        self.with_conn(plant_service::list_plants)
    }

    fn delete(&self, id: &Uuid) -> Result<(), PersistError> {
        self.with_conn(|conn| plant_service::delete_plant(conn, id))
    }
}
