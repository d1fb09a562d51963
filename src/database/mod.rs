pub mod schema;

use crate::error::AppError;
use rusqlite::Connection;
use std::path::Path;

/// Opens (or creates) the database at `db_path` with the full schema
pub fn init_database(db_path: &Path) -> Result<Connection, AppError> {
    // Sicherstellen dass das Verzeichnis existiert
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    log::info!("Opened database {}", db_path.display());

    schema::init_schema(&conn)?;

    Ok(conn)
}

/// In-memory database with schema, used by tests and previews
pub fn init_in_memory() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory()?;
    schema::init_schema(&conn)?;
    Ok(conn)
}
