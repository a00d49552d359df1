//! Logits to probabilities and a top-1 decision.

use crate::models::labels::LabelTable;
use crate::utils::error::InferenceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Numerically stable softmax: the max logit is subtracted before exponentiating.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max_val = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let exps: Vec<f32> = logits.iter().map(|v| (v - max_val).exp()).collect();
    // The max element contributes exp(0) = 1, so the sum is at least 1.
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest entry; the first occurrence wins ties.
pub fn top1(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, best_v)) if v <= best_v => best,
            _ => Some((i, v)),
        })
}

/// Indices of the `k` largest entries, descending, lower index first on ties.
pub fn top_k_indices(values: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    // Stable sort keeps index order among equal scores.
    indices.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    indices.truncate(k);
    indices
}

/// One ranked class in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub class_index: usize,
    pub probability: f32,
}

/// Classification output before timing is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub label: String,
    pub confidence: f32,
    pub class_index: usize,
    pub top_predictions: Vec<LabelScore>,
}

#[derive(Debug, Clone)]
pub struct Postprocessor {
    labels: Arc<LabelTable>,
    top_k: usize,
}

impl Postprocessor {
    pub fn new(labels: Arc<LabelTable>, top_k: usize) -> Self {
        Self { labels, top_k }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn decide(&self, logits: &[f32]) -> Result<Decision, InferenceError> {
        // NaN or infinite scores mean a malformed response
        if let Some(i) = logits.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite(i));
        }
        if logits.len() != self.labels.len() {
            tracing::debug!(
                "Model produced {} logits but the label table has {} entries",
                logits.len(),
                self.labels.len()
            );
        }

        // Probabilities, then the first-occurrence maximum
        let probabilities = softmax(logits);
        let (class_index, confidence) = top1(&probabilities).ok_or(InferenceError::EmptyOutput)?;

        // Ranked alternatives
        let top_predictions = top_k_indices(&probabilities, self.top_k)
            .into_iter()
            .map(|i| LabelScore {
                label: self.labels.label_for(i).into_owned(),
                class_index: i,
                probability: probabilities[i],
            })
            .collect();

        Ok(Decision {
            label: self.labels.label_for(class_index).into_owned(),
            confidence,
            class_index,
            top_predictions,
        })
    }
}
