use crate::classify::ImageClassifier;
use crate::config::{ExecutionTarget, OptimizationLevel};
use crate::models::OnnxEngine;
use crate::utils::error::VisionError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Process-wide holder of the loaded classifier.
pub struct ModelManager {
    classifier: Arc<ImageClassifier<OnnxEngine>>,
    config: Config,
}

static MODEL_MANAGER: OnceCell<Arc<ModelManager>> = OnceCell::new();

impl ModelManager {
    /// Loads the model and labels once for the whole process.
    pub fn init(config: Config) -> Result<()> {
        tracing::info!("Initializing model manager...");

        let classifier = Arc::new(ImageClassifier::load(&config)?);
        tracing::info!(
            "Classifier ready: {} labels, input {}x{}",
            classifier.labels().len(),
            classifier.input_size(),
            classifier.input_size()
        );

        let manager = ModelManager { classifier, config };

        MODEL_MANAGER
            .set(Arc::new(manager))
            .map_err(|_| VisionError::Internal("Model manager already initialized".to_string()))?;

        tracing::info!("Model manager initialized successfully");
        Ok(())
    }

    pub fn instance() -> Result<Arc<ModelManager>> {
        MODEL_MANAGER
            .get()
            .cloned()
            .ok_or_else(|| VisionError::Internal("Model manager not initialized".to_string()))
    }

    pub fn classifier(&self) -> Arc<ImageClassifier<OnnxEngine>> {
        Arc::clone(&self.classifier)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a synthetic image end to end through the loaded model.
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");
        self.classifier.probe()?;
        tracing::debug!("Model health check passed");
        Ok(())
    }

    pub fn get_stats(&self) -> ModelStats {
        let engine = self.classifier.engine();
        ModelStats {
            model_file: self.config.model_file.clone(),
            input_name: engine.input_name().to_string(),
            output_name: engine.output_name().to_string(),
            num_labels: self.classifier.labels().len(),
            input_size: self.classifier.input_size(),
            top_k: self.config.top_k,
            intra_threads: self.config.onnx_config.intra_threads,
            optimization_level: self.config.onnx_config.optimization_level,
            execution_target: self.config.onnx_config.execution_target,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub model_file: String,
    pub input_name: String,
    pub output_name: String,
    pub num_labels: usize,
    pub input_size: u32,
    pub top_k: usize,
    pub intra_threads: usize,
    pub optimization_level: OptimizationLevel,
    pub execution_target: ExecutionTarget,
}

pub fn get_classifier() -> Result<Arc<ImageClassifier<OnnxEngine>>> {
    Ok(ModelManager::instance()?.classifier())
}

pub fn health_check() -> Result<()> {
    ModelManager::instance()?.health_check()
}

pub fn get_model_stats() -> Result<ModelStats> {
    Ok(ModelManager::instance()?.get_stats())
}
