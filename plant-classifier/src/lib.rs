//! # Plant Classifier
//!
//! Maps a photo to a short, human-readable label using a fixed, pre-trained
//! image classification model.
//!
//! This crate provides:
//! - Image preprocessing (decode, EXIF orientation, letterbox, normalization)
//! - An [`InferenceEngine`] seam with an ONNX implementation (feature `tract`)
//! - Top-1 selection with an optional confidence threshold
//! - Label normalization ("rose, flower" becomes "rose")
//! - Async classification on the blocking thread pool
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use plant_classifier::{ClassifierConfig, ClassifierService, ClassificationResult};
//!
//! let service = ClassifierService::init(ClassifierConfig::default())?;
//! match service.classify(photo_bytes.into()).await {
//!     ClassificationResult::Label(name) => println!("{}", name),
//!     ClassificationResult::Failure(reason) => println!("could not identify: {}", reason),
//! }
//! ```

pub mod engine;
pub mod labels;
pub mod models;
pub mod preprocess;
pub mod service;

#[cfg(feature = "tract")]
pub mod tract_engine;

pub use engine::{EngineError, InferenceEngine};
pub use labels::{canonical_label, load_labels};
pub use models::{
    Classification, ClassificationRequest, ClassificationResult, ClassifierConfig,
    ClassifierErrorKind,
};
pub use preprocess::{ModelInput, PreprocessError};
pub use service::{select_label, ClassifierService, ModelLoadError};

#[cfg(feature = "tract")]
pub use tract_engine::TractEngine;
