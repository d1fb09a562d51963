//! # Leafy
//!
//! Identify a plant from a photo and keep it in a personal garden.
//!
//! The classifier itself lives in the `plant-classifier` crate. This crate
//! adds the identification workflow, the SQLite record store and the
//! configuration, logging and picker plumbing around it.

pub mod config;
pub mod database;
pub mod error;
pub mod filesystem;
pub mod image_processing;
pub mod logging;
pub mod models;
pub mod picker;
pub mod services;
pub mod store;
pub mod workflow;

pub use error::{AppError, PersistError, WorkflowError};
pub use store::{PlantStore, SqlitePlantStore};
pub use workflow::{IdentificationWorkflow, PhotoSettings, SessionState};
