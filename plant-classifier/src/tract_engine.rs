use crate::engine::{rank_scores, EngineError, InferenceEngine};
use crate::labels::{check_label_count, load_labels};
use crate::models::{Classification, ClassifierConfig};
use crate::preprocess::ModelInput;
use crate::service::ModelLoadError;
use tract_onnx::prelude::*;

type RunModel = dyn Fn(Tensor) -> TractResult<TVec<TValue>> + Send + Sync;

/// ONNX image classifier executed with tract
pub struct TractEngine {
    run: Box<RunModel>,
    labels: Vec<String>,
    input_shape: [usize; 4],
    top_k: usize,
}

impl TractEngine {
    /// Loads labels and model, optimizes the graph for a fixed input shape
    pub fn load(config: &ClassifierConfig) -> Result<Self, ModelLoadError> {
        let labels = load_labels(&config.labels_path)?;
        let input_shape = [
            1,
            3,
            config.input_height as usize,
            config.input_width as usize,
        ];

        log::info!(
            "Loading model {} with input {:?}",
            config.model_path.display(),
            input_shape
        );

        let model_error = |e: TractError| {
            ModelLoadError::Model(format!("{}: {}", config.model_path.display(), e))
        };
        let model = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|model| model.into_optimized())
            .map_err(model_error)?;

        match output_classes(&model) {
            Some(classes) => check_label_count(classes, labels.len())?,
            None => log::warn!("Model output shape is not fixed, label count not checked"),
        }

        let plan = model.into_runnable().map_err(model_error)?;

        let run = move |input: Tensor| plan.run(tvec!(input.into_tvalue()));

        Ok(Self {
            run: Box::new(run),
            labels,
            input_shape,
            top_k: config.top_k,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Number of classes in the first output, if the optimized shape is concrete
fn output_classes(model: &TypedModel) -> Option<usize> {
    let fact = model.output_fact(0).ok()?;
    fact.shape.as_concrete()?.last().copied()
}

impl InferenceEngine for TractEngine {
    fn infer(&self, input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
        if input.shape() != self.input_shape {
            return Err(EngineError::InvalidInput(format!(
                "expected {:?}, got {:?}",
                self.input_shape,
                input.shape()
            )));
        }

        let [n, c, h, w] = self.input_shape;
        let tensor = tract_ndarray::Array4::from_shape_vec((n, c, h, w), input.data.clone())
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?
            .into_tensor();

        let outputs = (self.run)(tensor).map_err(|e| EngineError::Execution(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| EngineError::Output("model returned no outputs".to_string()))?
            .to_array_view::<f32>()
            .map_err(|e| EngineError::Output(e.to_string()))?;

        let scores: Vec<f32> = output.iter().copied().collect();
        rank_scores(&scores, &self.labels, self.top_k)
    }
}
