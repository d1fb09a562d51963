use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Largest accepted model input side in pixels
pub const MAX_INPUT_SIDE: u32 = 4096;

/// An encoded image handed to the classifier (JPEG, PNG, WebP, ...)
///
/// Cloning is cheap, the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    bytes: Arc<[u8]>,
}

impl ClassificationRequest {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for ClassificationRequest {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// One ranked candidate produced by an inference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Why a classification did not produce a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierErrorKind {
    /// The buffer could not be decoded or normalized into model input
    ImageDecode,
    /// The inference runtime reported an execution fault
    InferenceEngine,
    /// The model produced zero usable candidates
    EmptyResult,
    /// The best candidate was below the configured minimum confidence
    LowConfidence,
    /// Inference did not finish within the configured timeout
    Timeout,
}

impl ClassifierErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierErrorKind::ImageDecode => "image_decode",
            ClassifierErrorKind::InferenceEngine => "inference_engine",
            ClassifierErrorKind::EmptyResult => "empty_result",
            ClassifierErrorKind::LowConfidence => "low_confidence",
            ClassifierErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ClassifierErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierErrorKind::ImageDecode => write!(f, "image could not be decoded"),
            ClassifierErrorKind::InferenceEngine => write!(f, "inference engine error"),
            ClassifierErrorKind::EmptyResult => write!(f, "model returned no candidates"),
            ClassifierErrorKind::LowConfidence => write!(f, "no candidate above threshold"),
            ClassifierErrorKind::Timeout => write!(f, "inference timed out"),
        }
    }
}

/// Outcome of a single classify call
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    Label(String),
    Failure(ClassifierErrorKind),
}

impl ClassificationResult {
    pub fn label(&self) -> Option<&str> {
        match self {
            ClassificationResult::Label(label) => Some(label),
            ClassificationResult::Failure(_) => None,
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, ClassificationResult::Label(_))
    }
}

/// Configuration of the classifier service and its model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// ONNX model file
    pub model_path: PathBuf,
    /// Text file with one label per line, in model output order
    pub labels_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    /// Per-channel (R, G, B) normalization applied after scaling to [0, 1]
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Number of candidates an engine reports
    pub top_k: usize,
    /// Candidates below this confidence are treated as "could not identify".
    /// `None` keeps the top-1 result regardless of confidence.
    pub min_confidence: Option<f32>,
    /// Upper bound for one inference run in milliseconds, `None` waits forever
    pub timeout_ms: Option<u64>,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Checks value ranges, returns a description of the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err("input size must be greater than zero".to_string());
        }
        if self.input_width > MAX_INPUT_SIDE || self.input_height > MAX_INPUT_SIDE {
            return Err(format!(
                "input size {}x{} exceeds {}",
                self.input_width, self.input_height, MAX_INPUT_SIDE
            ));
        }
        if self.std.iter().any(|s| *s <= 0.0) {
            return Err("std values must be positive".to_string());
        }
        if self.top_k == 0 {
            return Err("top_k must be at least 1".to_string());
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(format!("min_confidence {} is outside 0..=1", min));
            }
        }
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/mobilenetv2.onnx"),
            labels_path: PathBuf::from("models/labels.txt"),
            input_width: 224,
            input_height: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            top_k: 5,
            min_confidence: None,
            timeout_ms: None,
        }
    }
}
