use crate::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plant the user identified and decided to keep in the garden
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedPlant {
    pub id: Uuid,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// JPEG bytes, `None` renders as a placeholder
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
}

impl SavedPlant {
    /// Creates a new record with a fresh id, stamped now
    pub fn new(name: Option<String>, photo: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            photo,
        }
    }

    /// Validates the record before it is written
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.is_nil() {
            return Err(AppError::Validation("Plant must have an id".to_string()));
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Name must not be blank".to_string()));
            }
            if name.len() > 200 {
                return Err(AppError::Validation("Name is too long".to_string()));
            }
        }

        if matches!(&self.photo, Some(bytes) if bytes.is_empty()) {
            return Err(AppError::Validation("Photo must not be empty".to_string()));
        }

        Ok(())
    }

    /// Name shown in lists, falls back for records without a label
    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Plant")
    }
}

impl TryFrom<&Row<'_>> for SavedPlant {
    type Error = rusqlite::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let uuid_str: String = row.get("uuid")?;
        let id = Uuid::parse_str(&uuid_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(SavedPlant {
            id,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
            photo: row.get("photo")?,
        })
    }
}
