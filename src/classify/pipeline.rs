use crate::classify::batch::{BatchReport, BatchRun};
use crate::classify::types::{ClassificationResult, ItemStatus};
use crate::config::Config;
use crate::image::{ImageLoader, ImagePreprocessor, PixelGrid, Postprocessor, RawImage};
use crate::models::{InferenceEngine, LabelTable, OnnxEngine};
use crate::utils::error::{ClassificationError, VisionError};
use crate::Result;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Instant;

/// Decode -> preprocess -> infer -> postprocess for one image at a time.
pub struct ImageClassifier<E> {
    loader: ImageLoader,
    preprocessor: ImagePreprocessor,
    engine: E,
    postprocessor: Postprocessor,
}

impl ImageClassifier<OnnxEngine> {
    /// Loads the ONNX model and label table named by `config`.
    pub fn load(config: &Config) -> Result<Self> {
        let labels = Arc::new(LabelTable::load(&config.labels_path())?);
        let engine = OnnxEngine::new(&config.model_path(), &config.onnx_config)?;

        // A mismatch is tolerated; out-of-range indices fall back to `Unknown(i)`
        labels_match_model(engine.declared_classes(), labels.len());

        Self::new(engine, labels, config)
    }
}

/// Compares the model's declared class count with the label table, warning on mismatch.
/// A dynamic class axis cannot be checked and counts as a match.
pub(crate) fn labels_match_model(declared_classes: Option<usize>, label_count: usize) -> bool {
    match declared_classes {
        Some(classes) if classes != label_count => {
            tracing::warn!(
                "Model declares {} classes but the label table has {} entries",
                classes,
                label_count
            );
            false
        }
        _ => true,
    }
}

impl<E: InferenceEngine> ImageClassifier<E> {
    pub fn new(engine: E, labels: Arc<LabelTable>, config: &Config) -> Result<Self> {
        Ok(Self::from_parts(
            ImageLoader::new(config.max_image_bytes),
            ImagePreprocessor::from_config(&config.preprocess)?,
            engine,
            Postprocessor::new(labels, config.top_k),
        ))
    }

    pub fn from_parts(
        loader: ImageLoader,
        preprocessor: ImagePreprocessor,
        engine: E,
        postprocessor: Postprocessor,
    ) -> Self {
        Self {
            loader,
            preprocessor,
            engine,
            postprocessor,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        self.postprocessor.labels()
    }

    pub fn input_size(&self) -> u32 {
        self.preprocessor.input_size()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Classifies one image. Stops at the first failing stage.
    pub fn classify(
        &self,
        image: &RawImage,
    ) -> std::result::Result<ClassificationResult, ClassificationError> {
        let start_time = Instant::now();

        // Decode
        let grid = self.loader.decode(image)?;

        // Stretch and normalize; the pixel grid is not needed afterwards
        let tensor = self.preprocessor.process(&grid);
        drop(grid);

        // Inference, timed on its own
        let inference_start = Instant::now();
        let logits = self.engine.infer(tensor)?;
        let inference_time = inference_start.elapsed();

        // Softmax, top-1 and label lookup
        let decision = self.postprocessor.decide(&logits)?;
        let elapsed = start_time.elapsed();

        tracing::debug!(
            "Classified '{}': label={}, confidence={:.4}, inference={:.2}ms, total={:.2}ms",
            image.name,
            decision.label,
            decision.confidence,
            inference_time.as_secs_f64() * 1000.0,
            elapsed.as_secs_f64() * 1000.0
        );

        Ok(ClassificationResult {
            label: decision.label,
            confidence: decision.confidence,
            class_index: decision.class_index,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            inference_ms: inference_time.as_secs_f64() * 1000.0,
            top_predictions: decision.top_predictions,
        })
    }

    /// Runs a uniform gray image through preprocessing, inference and postprocessing.
    pub fn probe(&self) -> std::result::Result<(), ClassificationError> {
        let size = self.preprocessor.input_size();
        let grid = PixelGrid::from_rgba(RgbaImage::from_pixel(size, size, Rgba([128, 128, 128, 255])));
        let logits = self.engine.infer(self.preprocessor.process(&grid))?;
        self.postprocessor.decide(&logits)?;
        Ok(())
    }

    /// Starts a sequential batch run over `images`; nothing happens until it is iterated.
    pub fn classify_batch<'a>(&'a self, images: &'a [RawImage]) -> BatchRun<'a, E> {
        BatchRun::new(self, images)
    }
}

/// Classification for async callers; the work runs on the blocking pool.
#[async_trait::async_trait]
pub trait AsyncClassifier {
    async fn classify_async(&self, image: RawImage) -> Result<ClassificationResult>;

    async fn classify_batch_async(&self, images: Vec<RawImage>) -> Result<BatchReport>;
}

#[async_trait::async_trait]
impl<E: InferenceEngine + 'static> AsyncClassifier for Arc<ImageClassifier<E>> {
    async fn classify_async(&self, image: RawImage) -> Result<ClassificationResult> {
        let classifier = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || classifier.classify(&image))
            .await
            .map_err(|e| VisionError::Internal(format!("Classification task failed: {}", e)))??;
        Ok(result)
    }

    async fn classify_batch_async(&self, images: Vec<RawImage>) -> Result<BatchReport> {
        let classifier = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            // Drain the run, logging as items finish
            let mut run = classifier.classify_batch(&images);
            for event in run.by_ref() {
                if event.item.status.is_terminal() {
                    tracing::debug!(
                        "Batch progress: {}/{} '{}' -> {:?}",
                        event.index + 1,
                        event.total,
                        event.item.name,
                        event.item.status
                    );
                }
                if event.item.status == ItemStatus::Error {
                    tracing::warn!(
                        "Batch item '{}' failed: {}",
                        event.item.name,
                        event.item.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            run.into_report()
        })
        .await
        .map_err(|e| VisionError::Internal(format!("Batch task failed: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image::loader::tests::png;
    use crate::image::preprocessing::InputTensor;
    use crate::utils::error::{DecodeError, InferenceError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed logits, failing on the calls listed in `fail_on`.
    pub(crate) struct ScriptedEngine {
        pub logits: Vec<f32>,
        pub fail_on: Vec<usize>,
        pub calls: AtomicUsize,
    }

    impl ScriptedEngine {
        pub(crate) fn new(logits: Vec<f32>) -> Self {
            Self {
                logits,
                fail_on: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_on(mut self, calls: &[usize]) -> Self {
            self.fail_on = calls.to_vec();
            self
        }
    }

    impl InferenceEngine for ScriptedEngine {
        fn infer(&self, input: InputTensor) -> std::result::Result<Vec<f32>, InferenceError> {
            assert_eq!(input.shape(), &[1, 3, 8, 8]);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(InferenceError::Backend(format!("scripted failure on call {call}")));
            }
            Ok(self.logits.clone())
        }
    }

    pub(crate) fn test_config() -> Config {
        let mut config = Config::new("127.0.0.1:0".into(), "models".into(), Some(1), false).unwrap();
        config.preprocess.input_size = 8;
        config.top_k = 2;
        config
    }

    pub(crate) fn classifier(engine: ScriptedEngine) -> ImageClassifier<ScriptedEngine> {
        let labels = Arc::new(LabelTable::new(vec![
            "cat".to_string(),
            "dog".to_string(),
            "bird".to_string(),
        ]));
        ImageClassifier::new(engine, labels, &test_config()).unwrap()
    }

    #[test]
    fn classify_produces_complete_result() {
        let classifier = classifier(ScriptedEngine::new(vec![0.0, 5.0, 1.0]));
        let result = classifier
            .classify(&RawImage::new("dog.png", png(20, 10, [1, 2, 3])))
            .unwrap();

        assert_eq!(result.label, "dog");
        assert_eq!(result.class_index, 1);
        assert!(result.confidence > 0.9 && result.confidence <= 1.0);
        assert!(result.elapsed_ms >= result.inference_ms);
        assert_eq!(result.top_predictions.len(), 2);
        assert_eq!(result.top_predictions[1].label, "bird");
    }

    #[test]
    fn decode_failure_skips_inference() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let err = classifier
            .classify(&RawImage::new("junk.bin", b"junk".to_vec()))
            .unwrap_err();

        assert!(matches!(
            err,
            ClassificationError::Decode(DecodeError::UnsupportedFormat(_))
        ));
        assert_eq!(classifier.engine().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inference_failure_is_wrapped() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]).failing_on(&[0]));
        let err = classifier
            .classify(&RawImage::new("a.png", png(8, 8, [0, 0, 0])))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::Inference(InferenceError::Backend(_))
        ));
    }

    #[test]
    fn malformed_response_is_an_inference_error() {
        let classifier = classifier(ScriptedEngine::new(vec![f32::INFINITY, 0.0, 0.0]));
        let err = classifier
            .classify(&RawImage::new("a.png", png(8, 8, [0, 0, 0])))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::Inference(InferenceError::NonFinite(0))
        ));
    }

    #[test]
    fn label_mismatch_degrades_to_placeholder() {
        let classifier = classifier(ScriptedEngine::new(vec![0.0, 0.0, 0.0, 0.0, 9.0]));
        let result = classifier
            .classify(&RawImage::new("a.png", png(8, 8, [0, 0, 0])))
            .unwrap();
        assert_eq!(result.label, "Unknown(4)");
    }

    #[test]
    fn label_count_is_checked_against_declared_classes() {
        assert!(labels_match_model(Some(1000), 1000));
        assert!(!labels_match_model(Some(1001), 1000));
        assert!(!labels_match_model(Some(2), 3));
        assert!(labels_match_model(None, 1000));
    }

    #[test]
    fn probe_exercises_engine() {
        let healthy = classifier(ScriptedEngine::new(vec![0.0, 1.0, 0.0]));
        healthy.probe().unwrap();
        assert_eq!(healthy.engine().calls.load(Ordering::SeqCst), 1);

        let broken = classifier(ScriptedEngine::new(vec![]));
        assert!(broken.probe().is_err());
    }

    #[tokio::test]
    async fn async_classification_runs_on_blocking_pool() {
        let classifier = Arc::new(classifier(ScriptedEngine::new(vec![3.0, 0.0, 0.0])));
        let result = classifier
            .classify_async(RawImage::new("cat.png", png(8, 8, [9, 9, 9])))
            .await
            .unwrap();
        assert_eq!(result.label, "cat");

        let err = classifier
            .classify_async(RawImage::new("empty.png", Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "IMAGE_DECODE_ERROR");
    }

    #[tokio::test]
    async fn async_batch_returns_full_report() {
        let classifier = Arc::new(classifier(ScriptedEngine::new(vec![0.0, 0.0, 4.0])));
        let images = vec![
            RawImage::new("a.png", png(8, 8, [1, 1, 1])),
            RawImage::new("b.txt", b"nope".to_vec()),
        ];
        let report = classifier.classify_batch_async(images).await.unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].status, ItemStatus::Done);
        assert_eq!(report.items[1].status, ItemStatus::Error);
        assert_eq!(report.statistics.unwrap().label_counts.get("bird"), Some(&1));
    }
}
