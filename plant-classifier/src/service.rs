use crate::engine::InferenceEngine;
use crate::labels::canonical_label;
use crate::models::{
    Classification, ClassificationRequest, ClassificationResult, ClassifierConfig,
    ClassifierErrorKind,
};
use crate::preprocess::prepare_input;
use std::sync::Arc;

/// Error type for bringing up the classifier. The service is unusable without
/// its model, so callers treat this as fatal at startup.
#[derive(Debug)]
pub enum ModelLoadError {
    Config(String),
    Labels(String),
    Model(String),
}

impl std::fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelLoadError::Config(msg) => write!(f, "Invalid classifier config: {}", msg),
            ModelLoadError::Labels(msg) => write!(f, "Label list error: {}", msg),
            ModelLoadError::Model(msg) => write!(f, "Model load error: {}", msg),
        }
    }
}

impl std::error::Error for ModelLoadError {}

/// Classifier Service
///
/// Owns one model handle for its whole lifetime. Cloning shares the handle.
#[derive(Clone)]
pub struct ClassifierService {
    engine: Arc<dyn InferenceEngine>,
    config: ClassifierConfig,
}

impl ClassifierService {
    /// Loads the configured ONNX model eagerly
    #[cfg(feature = "tract")]
    pub fn init(config: ClassifierConfig) -> Result<Self, ModelLoadError> {
        config.validate().map_err(ModelLoadError::Config)?;
        let engine = crate::tract_engine::TractEngine::load(&config)?;
        log::info!(
            "Classifier ready ({} labels, min_confidence: {:?})",
            engine.labels().len(),
            config.min_confidence
        );
        Ok(Self::from_engine(Arc::new(engine), config))
    }

    /// Wraps an already loaded engine
    pub fn from_engine(engine: Arc<dyn InferenceEngine>, config: ClassifierConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Runs the whole pipeline on the current thread.
    ///
    /// Prefer [`ClassifierService::classify`] from interactive code.
    pub fn classify_blocking(&self, request: &ClassificationRequest) -> ClassificationResult {
        let input = match prepare_input(
            request.bytes(),
            self.config.input_width,
            self.config.input_height,
            self.config.mean,
            self.config.std,
        ) {
            Ok(input) => input,
            Err(e) => {
                log::warn!("Preprocessing failed ({} bytes): {}", request.len(), e);
                return ClassificationResult::Failure(ClassifierErrorKind::ImageDecode);
            }
        };

        let candidates = match self.engine.infer(&input) {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("Inference failed: {}", e);
                return ClassificationResult::Failure(ClassifierErrorKind::InferenceEngine);
            }
        };

        log::debug!("Model returned {} candidates", candidates.len());
        select_label(candidates, self.config.min_confidence)
    }

    /// Classifies on the blocking thread pool and resolves exactly once.
    ///
    /// There is no cancellation; dropping the future only drops the result.
    pub async fn classify(&self, request: ClassificationRequest) -> ClassificationResult {
        let service = self.clone();
        let handle = tokio::task::spawn_blocking(move || service.classify_blocking(&request));

        let joined = match self.config.timeout() {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!("Inference exceeded {:?}", limit);
                    return ClassificationResult::Failure(ClassifierErrorKind::Timeout);
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) => {
                log::error!("Classification task aborted: {}", e);
                ClassificationResult::Failure(ClassifierErrorKind::InferenceEngine)
            }
        }
    }
}

/// Picks the most confident candidate and normalizes its label
pub fn select_label(
    candidates: Vec<Classification>,
    min_confidence: Option<f32>,
) -> ClassificationResult {
    let best = candidates
        .into_iter()
        .filter(|c| c.confidence.is_finite())
        .map(|c| (canonical_label(&c.label), c.confidence))
        .filter(|(label, _)| !label.is_empty())
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let Some((label, confidence)) = best else {
        log::warn!("No usable candidates");
        return ClassificationResult::Failure(ClassifierErrorKind::EmptyResult);
    };

    if let Some(min) = min_confidence {
        if confidence < min {
            log::info!(
                "Best candidate '{}' ({:.3}) below threshold {:.3}",
                label,
                confidence,
                min
            );
            return ClassificationResult::Failure(ClassifierErrorKind::LowConfidence);
        }
    }

    log::info!("Identified '{}' ({:.3})", label, confidence);
    ClassificationResult::Label(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::preprocess::ModelInput;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedEngine {
        candidates: Vec<Classification>,
        calls: AtomicUsize,
    }

    impl FixedEngine {
        fn new(candidates: Vec<Classification>) -> Arc<Self> {
            Arc::new(Self {
                candidates,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl InferenceEngine for FixedEngine {
        fn infer(&self, _input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }
    }

    struct BrokenEngine;

    impl InferenceEngine for BrokenEngine {
        fn infer(&self, _input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
            Err(EngineError::Execution("out of memory".to_string()))
        }
    }

    struct SlowEngine(Duration);

    impl InferenceEngine for SlowEngine {
        fn infer(&self, _input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
            std::thread::sleep(self.0);
            Ok(vec![Classification::new("rose", 0.9)])
        }
    }

    struct PanickingEngine;

    impl InferenceEngine for PanickingEngine {
        fn infer(&self, _input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
            panic!("engine bug");
        }
    }

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            input_width: 8,
            input_height: 8,
            ..ClassifierConfig::default()
        }
    }

    fn test_image() -> ClassificationRequest {
        let img = RgbImage::from_pixel(20, 12, Rgb([30, 160, 40]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        ClassificationRequest::from(buffer.into_inner())
    }

    #[test]
    fn test_top_label_is_normalized() {
        let engine = FixedEngine::new(vec![
            Classification::new("daisy", 0.2),
            Classification::new("rose, flower", 0.7),
            Classification::new("fern", 0.1),
        ]);
        let service = ClassifierService::from_engine(engine.clone(), small_config());

        let result = service.classify_blocking(&test_image());
        assert_eq!(result, ClassificationResult::Label("rose".to_string()));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_low_confidence_still_returns_top1_by_default() {
        let engine = FixedEngine::new(vec![Classification::new("cactus", 0.01)]);
        let service = ClassifierService::from_engine(engine, small_config());
        assert_eq!(
            service.classify_blocking(&test_image()),
            ClassificationResult::Label("cactus".to_string())
        );
    }

    #[test]
    fn test_threshold_rejects_low_confidence() {
        let engine = FixedEngine::new(vec![Classification::new("cactus", 0.1)]);
        let config = ClassifierConfig {
            min_confidence: Some(0.5),
            ..small_config()
        };
        let service = ClassifierService::from_engine(engine, config);
        assert_eq!(
            service.classify_blocking(&test_image()),
            ClassificationResult::Failure(ClassifierErrorKind::LowConfidence)
        );
    }

    #[test]
    fn test_decode_failure_skips_inference() {
        let engine = FixedEngine::new(vec![Classification::new("rose", 0.9)]);
        let service = ClassifierService::from_engine(engine.clone(), small_config());

        for bytes in [Vec::new(), b"<html>not a photo</html>".to_vec()] {
            let result = service.classify_blocking(&ClassificationRequest::from(bytes));
            assert_eq!(
                result,
                ClassificationResult::Failure(ClassifierErrorKind::ImageDecode)
            );
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_error_is_reported() {
        let service = ClassifierService::from_engine(Arc::new(BrokenEngine), small_config());
        assert_eq!(
            service.classify_blocking(&test_image()),
            ClassificationResult::Failure(ClassifierErrorKind::InferenceEngine)
        );
    }

    #[test]
    fn test_empty_result_is_reported() {
        let service = ClassifierService::from_engine(FixedEngine::new(vec![]), small_config());
        assert_eq!(
            service.classify_blocking(&test_image()),
            ClassificationResult::Failure(ClassifierErrorKind::EmptyResult)
        );
    }

    #[test]
    fn test_blank_labels_count_as_empty() {
        let engine = FixedEngine::new(vec![
            Classification::new(" , leaf", 0.8),
            Classification::new("moss", f32::NAN),
        ]);
        let service = ClassifierService::from_engine(engine, small_config());
        assert_eq!(
            service.classify_blocking(&test_image()),
            ClassificationResult::Failure(ClassifierErrorKind::EmptyResult)
        );
    }

    #[tokio::test]
    async fn test_async_classify_delivers_result() {
        let engine = FixedEngine::new(vec![Classification::new("tulip", 0.6)]);
        let service = ClassifierService::from_engine(engine.clone(), small_config());

        let result = service.classify(test_image()).await;
        assert_eq!(result, ClassificationResult::Label("tulip".to_string()));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_classify_timeout() {
        let config = ClassifierConfig {
            timeout_ms: Some(20),
            ..small_config()
        };
        let engine = Arc::new(SlowEngine(Duration::from_millis(500)));
        let service = ClassifierService::from_engine(engine, config);
        assert_eq!(
            service.classify(test_image()).await,
            ClassificationResult::Failure(ClassifierErrorKind::Timeout)
        );
    }

    #[tokio::test]
    async fn test_panicking_engine_becomes_engine_failure() {
        let service = ClassifierService::from_engine(Arc::new(PanickingEngine), small_config());
        assert_eq!(
            service.classify(test_image()).await,
            ClassificationResult::Failure(ClassifierErrorKind::InferenceEngine)
        );
    }
}
