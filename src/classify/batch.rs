//! Strictly sequential batch classification with per-item lifecycle tracking.
//!
//! A [`BatchRun`] is lazy: every call to `next()` performs exactly one state
//! transition on one item (`Pending -> Processing`, or `Processing -> Done | Error`)
//! and yields a snapshot of it. Items never run concurrently, and one item's failure
//! is recorded on that item only. To stop early, stop iterating (or call
//! [`BatchRun::cancel`]); an item already in `Processing` is still finished first.

use crate::classify::pipeline::ImageClassifier;
use crate::classify::stats::BatchStatistics;
use crate::classify::types::{BatchItem, ItemStatus};
use crate::image::RawImage;
use crate::models::InferenceEngine;
use serde::Serialize;
use std::time::Instant;

/// Snapshot of one item right after a state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEvent {
    pub index: usize,
    pub total: usize,
    pub item: BatchItem,
}

/// Final state of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BatchStatistics>,
    pub cancelled: bool,
}

pub struct BatchRun<'a, E> {
    classifier: &'a ImageClassifier<E>,
    sources: &'a [RawImage],
    items: Vec<BatchItem>,
    cursor: usize,
    cancelled: bool,
    started_at: Option<Instant>,
}

impl<'a, E: InferenceEngine> BatchRun<'a, E> {
    pub(crate) fn new(classifier: &'a ImageClassifier<E>, sources: &'a [RawImage]) -> Self {
        let items = sources
            .iter()
            .enumerate()
            .map(|(i, source)| BatchItem::pending(i, source.name.clone()))
            .collect();

        Self {
            classifier,
            sources,
            items,
            cursor: 0,
            cancelled: false,
            started_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Index of the item currently in `Processing`, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.items
            .get(self.cursor)
            .filter(|item| item.status == ItemStatus::Processing)
            .map(|item| item.index)
    }

    /// Number of items in a terminal state.
    pub fn completed(&self) -> usize {
        self.cursor
    }

    /// Stops the run before the next pending item.
    pub fn cancel(&mut self) {
        if !self.is_finished() {
            tracing::info!(
                "Batch cancelled after {}/{} items",
                self.cursor,
                self.items.len()
            );
        }
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_finished(&self) -> bool {
        match self.items.get(self.cursor) {
            None => true,
            Some(item) => self.cancelled && item.status == ItemStatus::Pending,
        }
    }

    /// Statistics over the items finished so far.
    pub fn statistics(&self) -> Option<BatchStatistics> {
        BatchStatistics::compute(&self.items)
    }

    /// Drives the remaining items and returns the report.
    pub fn finish(mut self) -> BatchReport {
        self.by_ref().for_each(drop);
        self.into_report()
    }

    /// Returns the report without processing anything further.
    pub fn into_report(self) -> BatchReport {
        let statistics = BatchStatistics::compute(&self.items);
        BatchReport {
            items: self.items,
            statistics,
            cancelled: self.cancelled,
        }
    }

    fn event(&self, index: usize) -> BatchEvent {
        BatchEvent {
            index,
            total: self.items.len(),
            item: self.items[index].clone(),
        }
    }

    fn log_summary(&self) {
        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        let done = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Done)
            .count();
        tracing::info!(
            "Batch completed: items={}, done={}, failed={}, time={:.3}s",
            self.items.len(),
            done,
            self.cursor - done,
            elapsed.as_secs_f32()
        );
    }
}

impl<'a, E: InferenceEngine> Iterator for BatchRun<'a, E> {
    type Item = BatchEvent;

    fn next(&mut self) -> Option<BatchEvent> {
        let index = self.cursor;
        let status = self.items.get(index)?.status;

        match status {
            // Pending -> Processing, unless the run was cancelled between items
            ItemStatus::Pending => {
                if self.cancelled {
                    return None;
                }
                if index == 0 {
                    self.started_at = Some(Instant::now());
                }
                self.items[index].start();
                Some(self.event(index))
            }
            // Processing -> Done | Error; a failure stays local to this item
            ItemStatus::Processing => {
                match self.classifier.classify(&self.sources[index]) {
                    Ok(result) => self.items[index].complete(result),
                    Err(e) => {
                        tracing::debug!("Item {} ('{}') failed: {}", index, self.sources[index].name, e);
                        self.items[index].fail(e.to_string());
                    }
                }
                // Advance to the next item
                self.cursor += 1;
                if self.cursor == self.items.len() {
                    self.log_summary();
                }
                Some(self.event(index))
            }
            // Terminal items are always behind the cursor.
            ItemStatus::Done | ItemStatus::Error => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::pipeline::tests::{classifier, ScriptedEngine};
    use crate::image::loader::tests::png;

    fn images(n: usize) -> Vec<RawImage> {
        (0..n)
            .map(|i| RawImage::new(format!("img{i}.png"), png(12, 6, [i as u8, 0, 0])))
            .collect()
    }

    #[test]
    fn inference_failure_on_middle_item_does_not_abort() {
        let classifier = classifier(ScriptedEngine::new(vec![0.0, 2.0, 0.0]).failing_on(&[1]));
        let inputs = images(3);
        let report = classifier.classify_batch(&inputs).finish();

        let statuses: Vec<_> = report.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Done, ItemStatus::Error, ItemStatus::Done]
        );
        assert!(report.items[1].result.is_none());
        assert!(report.items[1].error.as_deref().unwrap().contains("scripted failure"));

        let stats = report.statistics.unwrap();
        assert_eq!(stats.done_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.label_counts.get("dog"), Some(&2));
        assert!(!report.cancelled);
    }

    #[test]
    fn events_follow_lifecycle_in_input_order() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let inputs = vec![
            RawImage::new("a.png", png(8, 8, [0, 0, 0])),
            RawImage::new("b.bin", b"not an image".to_vec()),
        ];
        let events: Vec<(usize, ItemStatus)> = classifier
            .classify_batch(&inputs)
            .map(|e| (e.index, e.item.status))
            .collect();

        assert_eq!(
            events,
            vec![
                (0, ItemStatus::Processing),
                (0, ItemStatus::Done),
                (1, ItemStatus::Processing),
                (1, ItemStatus::Error),
            ]
        );
    }

    #[test]
    fn run_is_lazy_and_exposes_current_index() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let inputs = images(2);
        let mut run = classifier.classify_batch(&inputs);

        assert_eq!(run.current_index(), None);
        assert!(run.items().iter().all(|i| i.status == ItemStatus::Pending));
        assert_eq!(classifier.engine().calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        let event = run.next().unwrap();
        assert_eq!(event.item.status, ItemStatus::Processing);
        assert_eq!(event.total, 2);
        assert_eq!(run.current_index(), Some(0));

        run.next().unwrap();
        assert_eq!(run.current_index(), None);
        assert_eq!(run.completed(), 1);
        assert_eq!(run.statistics().unwrap().done_count, 1);
    }

    #[test]
    fn cancel_between_items_leaves_rest_pending() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let inputs = images(3);
        let mut run = classifier.classify_batch(&inputs);

        run.next();
        run.next();
        run.cancel();
        assert!(run.is_finished());
        assert!(run.next().is_none());

        let report = run.into_report();
        assert!(report.cancelled);
        assert_eq!(report.items[0].status, ItemStatus::Done);
        assert_eq!(report.items[1].status, ItemStatus::Pending);
        assert_eq!(report.items[2].status, ItemStatus::Pending);
        assert_eq!(report.statistics.unwrap().done_count, 1);
    }

    #[test]
    fn cancel_mid_item_finishes_that_item_first() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let inputs = images(2);
        let mut run = classifier.classify_batch(&inputs);

        run.next();
        run.cancel();
        assert!(!run.is_finished());
        let event = run.next().unwrap();
        assert_eq!(event.item.status, ItemStatus::Done);
        assert!(run.next().is_none());
    }

    #[test]
    fn all_failures_yield_no_statistics() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]).failing_on(&[0, 1]));
        let inputs = images(2);
        let report = classifier.classify_batch(&inputs).finish();
        assert!(report.items.iter().all(|i| i.status == ItemStatus::Error));
        assert!(report.statistics.is_none());
    }

    #[test]
    fn empty_batch_finishes_immediately() {
        let classifier = classifier(ScriptedEngine::new(vec![1.0, 0.0, 0.0]));
        let mut run = classifier.classify_batch(&[]);
        assert!(run.is_finished());
        assert!(run.next().is_none());
        assert!(run.into_report().statistics.is_none());
    }
}
