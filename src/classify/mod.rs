pub mod batch;
pub mod pipeline;
pub mod stats;
pub mod types;

pub use batch::{BatchEvent, BatchReport, BatchRun};
pub use pipeline::{AsyncClassifier, ImageClassifier};
pub use stats::{BatchStatistics, ItemTiming};
pub use types::{BatchItem, ClassificationResult, ItemStatus};
