use rusqlite::{Connection, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize complete database schema for the Leafy app
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Schema version table for future migrations
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version = schema_version(conn)?;

    if current_version < 1 {
        create_schema(conn)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        log::info!("Database schema created (version {})", SCHEMA_VERSION);
    }

    Ok(())
}

/// Returns the highest applied schema version, 0 for a fresh database
pub fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Create the complete schema (version 1)
fn create_schema(conn: &Connection) -> Result<()> {
    // Table: saved_plants (identified plants in the garden)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS saved_plants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            name TEXT,
            created_at TEXT NOT NULL,
            photo BLOB
        )",
        [],
    )?;

    // Garden list is shown newest first
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_saved_plants_created ON saved_plants(created_at DESC)",
        [],
    )?;

    Ok(())
}
