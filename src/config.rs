use crate::error::AppError;
use crate::filesystem::resolve_path;
use plant_classifier::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file inside the app data directory
pub const CONFIG_FILE_NAME: &str = "leafy.toml";

/// Storage settings for saved plants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// JPEG quality for stored photos (1-100)
    pub photo_quality: u8,
    /// Longest side of stored photos in pixels
    pub photo_max_dimension: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("leafy.db"),
            photo_quality: 80,
            photo_max_dimension: 1024,
        }
    }
}

/// Complete app configuration, read from `leafy.toml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Parses a TOML document, missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Rewrites relative model and database paths to live below `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        self.classifier.model_path = resolve_path(base, &self.classifier.model_path);
        self.classifier.labels_path = resolve_path(base, &self.classifier.labels_path);
        self.storage.database_path = resolve_path(base, &self.storage.database_path);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.classifier.validate().map_err(AppError::Config)?;

        if !(1..=100).contains(&self.storage.photo_quality) {
            return Err(AppError::Config(format!(
                "photo_quality {} is outside 1..=100",
                self.storage.photo_quality
            )));
        }
        if self.storage.photo_max_dimension == 0 {
            return Err(AppError::Config(
                "photo_max_dimension must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
