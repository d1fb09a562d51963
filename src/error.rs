use plant_classifier::{ClassifierErrorKind, ModelLoadError};
use std::fmt;

/// Central error types for the Leafy app
#[derive(Debug)]
pub enum AppError {
    /// Database error (rusqlite)
    Database(rusqlite::Error),
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Configuration file could not be read or is invalid
    Config(String),
    /// The classification model could not be loaded at startup
    ModelLoad(ModelLoadError),
    /// Validation error (e.g. invalid inputs)
    Validation(String),
    /// Resource not found
    NotFound(String),
    /// Image processing error
    ImageProcessing(String),
    /// Record store error outside of the database itself
    Storage(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ModelLoad(e) => write!(f, "Classifier unavailable: {}", e),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ImageProcessing(msg) => write!(f, "Image processing error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<ModelLoadError> for AppError {
    fn from(e: ModelLoadError) -> Self {
        AppError::ModelLoad(e)
    }
}

impl From<PersistError> for AppError {
    fn from(e: PersistError) -> Self {
        match e {
            PersistError::Database(e) => AppError::Database(e),
            PersistError::NotFound(msg) => AppError::NotFound(msg),
            PersistError::Other(msg) => AppError::Storage(msg),
        }
    }
}

/// User-friendly error messages for UI
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check app permissions.".to_string()
            }
            AppError::Config(msg) => format!("The app configuration is invalid: {}", msg),
            AppError::ModelLoad(_) => {
                "Plant identification is unavailable on this device.".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
            AppError::ImageProcessing(_) => "Error processing image.".to_string(),
            AppError::Storage(_) => "Your garden could not be accessed.".to_string(),
        }
    }
}

/// Error type of the persisted-record store. Always retryable by the user.
#[derive(Debug)]
pub enum PersistError {
    Database(rusqlite::Error),
    NotFound(String),
    Other(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PersistError::Database(e) => write!(f, "Database error: {}", e),
            PersistError::NotFound(msg) => write!(f, "Not found: {}", msg),
            PersistError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<rusqlite::Error> for PersistError {
    fn from(e: rusqlite::Error) -> Self {
        PersistError::Database(e)
    }
}

/// Errors returned by the identification workflow
#[derive(Debug)]
pub enum WorkflowError {
    /// The operation is not allowed in the current session state
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
    /// Committing the record failed, the classification result is kept
    Persist(PersistError),
    /// Background work was requested outside of a tokio runtime
    NoRuntime(String),
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkflowError::InvalidTransition { operation, state } => {
                write!(f, "'{}' is not allowed while {}", operation, state)
            }
            WorkflowError::Persist(e) => write!(f, "Saving failed: {}", e),
            WorkflowError::NoRuntime(msg) => write!(f, "No async runtime available: {}", msg),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<PersistError> for WorkflowError {
    fn from(e: PersistError) -> Self {
        WorkflowError::Persist(e)
    }
}

impl WorkflowError {
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::InvalidTransition { .. } => {
                "This action is not available right now.".to_string()
            }
            WorkflowError::Persist(_) => {
                "Could not save the plant. Please try again.".to_string()
            }
            WorkflowError::NoRuntime(_) => {
                "Plant identification is unavailable right now.".to_string()
            }
        }
    }
}

/// The single message shown for every classification failure
pub fn classification_failure_message(reason: ClassifierErrorKind) -> String {
    log::debug!("Classification failed: {}", reason.as_str());
    "Could not identify this plant.".to_string()
}
