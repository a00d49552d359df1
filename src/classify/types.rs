use crate::image::postprocessing::LabelScore;
use serde::{Deserialize, Serialize};

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Top-1 label
    pub label: String,
    /// Probability of the top-1 class, in [0, 1]
    pub confidence: f32,
    pub class_index: usize,
    /// Wall-clock time from decode through postprocessing, in milliseconds
    pub elapsed_ms: f64,
    /// Time spent inside the inference engine, in milliseconds
    pub inference_ms: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_predictions: Vec<LabelScore>,
}

/// Lifecycle of a batch item: `Pending -> Processing -> Done | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Position in the input sequence
    pub index: usize,
    /// Identifier of the source image
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn pending(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: ItemStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub(crate) fn start(&mut self) {
        debug_assert_eq!(self.status, ItemStatus::Pending);
        if self.status == ItemStatus::Pending {
            self.status = ItemStatus::Processing;
        }
    }

    pub(crate) fn complete(&mut self, result: ClassificationResult) {
        debug_assert_eq!(self.status, ItemStatus::Processing);
        if self.status == ItemStatus::Processing {
            self.status = ItemStatus::Done;
            self.result = Some(result);
        }
    }

    pub(crate) fn fail(&mut self, error: String) {
        debug_assert_eq!(self.status, ItemStatus::Processing);
        if self.status == ItemStatus::Processing {
            self.status = ItemStatus::Error;
            self.error = Some(error);
        }
    }

    /// The result, when the item finished successfully.
    pub fn done_result(&self) -> Option<&ClassificationResult> {
        match self.status {
            ItemStatus::Done => self.result.as_ref(),
            _ => None,
        }
    }
}
