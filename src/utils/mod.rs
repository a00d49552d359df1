pub mod error;

pub use error::{ClassificationError, DecodeError, InferenceError, VisionError};
