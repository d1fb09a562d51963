use crate::error::AppError;
use crate::models::SavedPlant;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Inserts a new plant into the garden
pub fn create_plant(conn: &Connection, plant: &SavedPlant) -> Result<i64, AppError> {
    plant.validate()?;

    conn.execute(
        "INSERT INTO saved_plants (uuid, name, created_at, photo)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            plant.id.to_string(),
            &plant.name,
            &plant.created_at,
            &plant.photo,
        ],
    )?;

    log::debug!("Inserted plant {} ({})", plant.id, plant.title());
    Ok(conn.last_insert_rowid())
}

/// Lists all saved plants, newest first
pub fn list_plants(conn: &Connection) -> Result<Vec<SavedPlant>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT uuid, name, created_at, photo
         FROM saved_plants
         ORDER BY created_at DESC, id DESC",
    )?;

    let plants = stmt
        .query_map([], |row| SavedPlant::try_from(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(plants)
}

/// Removes a plant from the garden
pub fn delete_plant(conn: &Connection, id: &Uuid) -> Result<(), AppError> {
    let rows_affected = conn.execute(
        "DELETE FROM saved_plants WHERE uuid = ?1",
        [id.to_string()],
    )?;

    if rows_affected == 0 {
        return Err(AppError::NotFound("Plant".to_string()));
    }

    Ok(())
}
