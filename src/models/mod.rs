pub mod engine;
pub mod labels;
pub mod manager;

pub use engine::{InferenceEngine, OnnxEngine, OutputTensor};
pub use labels::LabelTable;
pub use manager::{ModelManager, ModelStats};

// Re-export convenience functions from manager
pub use manager::{get_classifier, get_model_stats, health_check};
