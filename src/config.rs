use crate::utils::error::VisionError;
use crate::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Name of the optional per-model preprocessing override in the models directory.
pub const PREPROCESS_SIDECAR: &str = "preprocess.json";

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Directory holding the model and label files
    pub models_dir: PathBuf,

    /// Model file name inside `models_dir`
    pub model_file: String,

    /// Label file name inside `models_dir`
    pub labels_file: String,

    /// Worker thread count
    pub workers: usize,

    /// Development mode
    pub dev_mode: bool,

    /// Number of ranked predictions attached to each result
    pub top_k: usize,

    /// Largest encoded image accepted, in bytes
    pub max_image_bytes: usize,

    pub onnx_config: OnnxConfig,

    pub server_config: ServerConfig,

    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// Intra-op thread count
    pub intra_threads: usize,

    pub optimization_level: OptimizationLevel,

    pub execution_target: ExecutionTarget,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    /// Maximum number of files accepted by one batch request
    pub max_batch_items: usize,
}

/// Graph optimization level, kept separate from the ort type so it can be parsed and serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

/// Hardware the session should execute on. CUDA falls back to CPU when unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    #[default]
    Cpu,
    Cuda,
}

/// Interpolation used when stretching the decoded image to the model input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

/// Per-model input calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Edge length of the square model input
    pub input_size: u32,
    /// Per-channel mean, RGB order
    pub mean: [f32; 3],
    /// Per-channel standard deviation, RGB order
    pub std: [f32; 3],
    pub filter: ResizeFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            filter: ResizeFilter::Bilinear,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);
        if workers == 0 {
            return Err(VisionError::Config("workers must be at least 1".to_string()));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1),
            optimization_level: OptimizationLevel::All,
            execution_target: ExecutionTarget::Cpu,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 50 * 1024 * 1024,
            max_batch_items: if dev_mode { 16 } else { 64 },
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            model_file: "mobilenetv2.onnx".to_string(),
            labels_file: "labels.txt".to_string(),
            workers,
            dev_mode,
            top_k: 5,
            max_image_bytes: 50 * 1024 * 1024,
            onnx_config,
            server_config,
            preprocess: PreprocessConfig::default(),
        })
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.models_dir.join(&self.labels_file)
    }

    pub fn preprocess_sidecar_path(&self) -> PathBuf {
        self.models_dir.join(PREPROCESS_SIDECAR)
    }

    /// Replaces `preprocess` with the models directory's sidecar, if there is one.
    pub fn load_preprocess_sidecar(&mut self) -> Result<bool> {
        let path = self.preprocess_sidecar_path();
        if !path.exists() {
            return Ok(false);
        }

        let content = fs::read_to_string(&path)?;
        let preprocess: PreprocessConfig = serde_json::from_str(&content)?;
        if preprocess.input_size == 0 {
            return Err(VisionError::Config(format!(
                "{}: input_size must be greater than 0",
                path.display()
            )));
        }

        tracing::info!(
            "Loaded preprocessing overrides from {}: size={}, mean={:?}, std={:?}",
            path.display(),
            preprocess.input_size,
            preprocess.mean,
            preprocess.std
        );
        self.preprocess = preprocess;
        Ok(true)
    }
}
