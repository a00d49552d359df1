pub mod loader;
pub mod postprocessing;
pub mod preprocessing;

pub use loader::{ImageLoader, PixelGrid, RawImage};
pub use postprocessing::{softmax, top1, Decision, LabelScore, Postprocessor};
pub use preprocessing::{ImagePreprocessor, InputTensor, Normalization};
