use crate::classify::types::{BatchItem, ItemStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTiming {
    pub index: usize,
    pub name: String,
    pub elapsed_ms: f64,
}

/// Aggregate over the `Done` items of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub total_items: usize,
    pub done_count: usize,
    pub error_count: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub mean_confidence: f64,
    pub mean_elapsed_ms: f64,
    pub fastest: ItemTiming,
    pub slowest: ItemTiming,
}

impl BatchStatistics {
    /// Returns `None` when no item is `Done`. Fastest/slowest ties go to the earlier item.
    pub fn compute(items: &[BatchItem]) -> Option<Self> {
        let done: Vec<(&BatchItem, f32, f64, &str)> = items
            .iter()
            .filter_map(|item| {
                item.done_result()
                    .map(|r| (item, r.confidence, r.elapsed_ms, r.label.as_str()))
            })
            .collect();

        let (first, _, first_ms, _) = *done.first()?;
        let mut fastest = (first, first_ms);
        let mut slowest = (first, first_ms);
        let mut label_counts = BTreeMap::new();
        let mut confidence_sum = 0.0f64;
        let mut elapsed_sum = 0.0f64;

        for &(item, confidence, elapsed_ms, label) in &done {
            *label_counts.entry(label.to_string()).or_insert(0) += 1;
            confidence_sum += confidence as f64;
            elapsed_sum += elapsed_ms;
            if elapsed_ms < fastest.1 {
                fastest = (item, elapsed_ms);
            }
            if elapsed_ms > slowest.1 {
                slowest = (item, elapsed_ms);
            }
        }

        let count = done.len() as f64;
        let timing = |(item, elapsed_ms): (&BatchItem, f64)| ItemTiming {
            index: item.index,
            name: item.name.clone(),
            elapsed_ms,
        };

        Some(Self {
            total_items: items.len(),
            done_count: done.len(),
            error_count: items
                .iter()
                .filter(|item| item.status == ItemStatus::Error)
                .count(),
            label_counts,
            mean_confidence: confidence_sum / count,
            mean_elapsed_ms: elapsed_sum / count,
            fastest: timing(fastest),
            slowest: timing(slowest),
        })
    }
}
