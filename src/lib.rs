pub mod classify;
pub mod config;
pub mod image;
pub mod models;
pub mod utils;
pub mod web;

pub use classify::{BatchItem, BatchReport, BatchStatistics, ClassificationResult, ImageClassifier, ItemStatus};
pub use config::Config;
pub use image::RawImage;
pub use utils::error::{ClassificationError, DecodeError, InferenceError, VisionError};

pub type Result<T> = std::result::Result<T, VisionError>;
