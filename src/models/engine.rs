use crate::config::{ExecutionTarget, OnnxConfig, OptimizationLevel};
use crate::image::preprocessing::InputTensor;
use crate::utils::error::{InferenceError, VisionError};
use crate::Result;
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider},
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, ValueType},
};
use parking_lot::Mutex;
use std::path::Path;

/// Raw per-class scores produced by a model.
pub type OutputTensor = Vec<f32>;

/// Opaque model execution: tensor in, logits out.
pub trait InferenceEngine: Send + Sync {
    fn infer(&self, input: InputTensor) -> std::result::Result<OutputTensor, InferenceError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn infer(&self, input: InputTensor) -> std::result::Result<OutputTensor, InferenceError> {
        (**self).infer(input)
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for std::sync::Arc<E> {
    fn infer(&self, input: InputTensor) -> std::result::Result<OutputTensor, InferenceError> {
        (**self).infer(input)
    }
}

impl From<OptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::Disable => GraphOptimizationLevel::Disable,
            OptimizationLevel::Basic => GraphOptimizationLevel::Level1,
            OptimizationLevel::Extended => GraphOptimizationLevel::Level2,
            OptimizationLevel::All => GraphOptimizationLevel::Level3,
        }
    }
}

/// ONNX Runtime backed engine. Runs are serialized through the session lock.
pub struct OnnxEngine {
    session: Mutex<Session>,
    input_name: String,
    output_name: String, // discovered from the session
    declared_classes: Option<usize>,
}

impl OnnxEngine {
    pub fn new(model_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        if !model_path.exists() {
            return Err(VisionError::ModelLoad(format!(
                "Classification model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!(
            "Loading classification model from: {} (target={:?}, optimization={:?})",
            model_path.display(),
            onnx_config.execution_target,
            onnx_config.optimization_level
        );

        let builder = Session::builder()?
            .with_optimization_level(onnx_config.optimization_level.into())?
            .with_intra_threads(onnx_config.intra_threads)?;
        let builder = match onnx_config.execution_target {
            ExecutionTarget::Cpu => {
                builder.with_execution_providers([CPUExecutionProvider::default().build()])?
            }
            ExecutionTarget::Cuda => builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?,
        };
        let session = builder.commit_from_file(model_path)?;

        // Discover tensor names and the declared class count

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(VisionError::ModelLoad(
                    "Classification model has no inputs".to_string(),
                ))
            }
        };
        let (output_name, declared_classes) = match session.outputs.first() {
            Some(output) => {
                let declared = match &output.output_type {
                    ValueType::Tensor { shape, .. } => {
                        let dims: Vec<i64> = shape.iter().copied().collect();
                        declared_class_count(&dims)
                    }
                    _ => None,
                };
                (output.name.clone(), declared)
            }
            None => {
                return Err(VisionError::ModelLoad(
                    "Classification model has no outputs".to_string(),
                ))
            }
        };
        tracing::info!(
            "Classification model input: '{}', output: '{}', classes: {}",
            input_name,
            output_name,
            declared_classes.map_or_else(|| "dynamic".to_string(), |n| n.to_string())
        );
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classification output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            declared_classes,
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Class count fixed by the model's output shape, `None` when that axis is dynamic.
    pub fn declared_classes(&self) -> Option<usize> {
        self.declared_classes
    }
}

impl InferenceEngine for OnnxEngine {
    fn infer(&self, input: InputTensor) -> std::result::Result<OutputTensor, InferenceError> {
        let input_tensor = Tensor::from_array(input.into_array())?;

        // One run at a time per session
        let mut session = self.session.lock();
        let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        let output = match outputs.get(&self.output_name) {
            Some(output) => output,
            None => {
                // Report what the model did produce
                let available = outputs.keys().map(|s| s.to_string()).collect();
                return Err(InferenceError::MissingOutput {
                    name: self.output_name.clone(),
                    available,
                });
            }
        };

        let predictions = output.try_extract_array::<f32>()?;
        flatten_logits(predictions.shape(), predictions.iter().copied())
    }
}

/// Trailing axis of a declared output shape. Dynamic (`-1`) or zero-sized axes give `None`.
pub(crate) fn declared_class_count(dims: &[i64]) -> Option<usize> {
    match dims.last() {
        Some(&n) if n > 0 => usize::try_from(n).ok(),
        _ => None,
    }
}

/// Accepts `[N]` or `[1, N]` shaped logits.
pub(crate) fn flatten_logits(
    shape: &[usize],
    values: impl Iterator<Item = f32>,
) -> std::result::Result<OutputTensor, InferenceError> {
    let batch_ok = match shape {
        [_] => true,
        [batch, _] => *batch == 1,
        _ => false,
    };
    if !batch_ok {
        return Err(InferenceError::UnexpectedShape(shape.to_vec()));
    }

    let logits: Vec<f32> = values.collect();
    if logits.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    Ok(logits)
}
