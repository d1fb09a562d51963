use crate::models::Classification;
use crate::preprocess::ModelInput;

/// Error reported by an inference runtime while executing the model
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Input does not match what the model expects
    InvalidInput(String),
    /// The forward pass failed
    Execution(String),
    /// The model output could not be interpreted
    Output(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EngineError::Execution(msg) => write!(f, "Execution failed: {}", msg),
            EngineError::Output(msg) => write!(f, "Unexpected output: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// A loaded image classification model.
///
/// Implementations return (label, confidence) candidates in any order; the
/// service does the ranking. The engine is shared across threads and must not
/// keep per-call state.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, input: &ModelInput) -> Result<Vec<Classification>, EngineError>;
}

impl<F> InferenceEngine for F
where
    F: Fn(&ModelInput) -> Result<Vec<Classification>, EngineError> + Send + Sync,
{
    fn infer(&self, input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
        self(input)
    }
}

/// Converts raw scores into probabilities unless they already look like ones
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let already_normalized =
        scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if already_normalized {
        return scores.to_vec();
    }

    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

/// Maps class scores to labelled candidates, best first, keeping `top_k`.
///
/// Models trained with a background class emit one more score than there are
/// labels; index 0 is dropped in that case.
pub fn rank_scores(
    scores: &[f32],
    labels: &[String],
    top_k: usize,
) -> Result<Vec<Classification>, EngineError> {
    let offset = if scores.len() == labels.len() + 1 {
        1
    } else if scores.len() == labels.len() {
        0
    } else {
        return Err(EngineError::Output(format!(
            "Model produced {} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    };

    let probabilities = to_probabilities(scores);
    let mut indexed: Vec<(usize, f32)> = probabilities
        .into_iter()
        .enumerate()
        .skip(offset)
        .filter(|(_, p)| p.is_finite())
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(top_k);

    Ok(indexed
        .into_iter()
        .map(|(idx, p)| Classification::new(labels[idx - offset].clone(), p))
        .collect())
}
