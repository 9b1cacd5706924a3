//! Delivery execution: send each planned unit, advance durable state.
//!
//! The executor is fail-fast. The first failed send (or failed commit) ends
//! the loop; whatever was committed before stays committed and nothing is
//! rolled back. When state is committed depends on [`CommitTiming`]:
//!
//! - `PerItem`: after every successful send. A crash after unit N leaves the
//!   state at N, so the next run resumes at N+1.
//! - `EndOfBatch`: once, after the last unit. A crash mid-batch leaves the
//!   pre-batch state, so the next run resends the whole batch.

use crate::error::{DeliveryError, RunError};
use crate::models::{DeliveryBatch, GroupingMode};
use crate::sink::MessageSink;
use crate::store::{SeenState, SeenStore};
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTiming {
    PerItem,
    EndOfBatch,
}

impl CommitTiming {
    /// Single messages commit one by one; chunk boundaries are not
    /// addressable in the stored state, so lists commit at the end.
    pub fn for_grouping(grouping: GroupingMode) -> Self {
        match grouping {
            GroupingMode::Single => CommitTiming::PerItem,
            GroupingMode::ChunkedList => CommitTiming::EndOfBatch,
        }
    }
}

/// Outcome of one delivery pass.
#[derive(Debug)]
pub struct DeliveryReport {
    /// Units sent successfully before any failure.
    pub sent_count: usize,
    pub total_count: usize,
    /// State after the last successful commit.
    pub state: SeenState,
    pub last_error: Option<DeliveryError>,
}

impl DeliveryReport {
    /// Turn a failed pass into a [`RunError::Delivery`] carrying the counts.
    pub fn into_result(mut self) -> Result<Self, RunError> {
        match self.last_error.take() {
            Some(source) => Err(RunError::Delivery {
                sent: self.sent_count,
                total: self.total_count,
                source,
            }),
            None => Ok(self),
        }
    }
}

fn commit_range(
    store: &mut dyn SeenStore,
    mut state: SeenState,
    batch: &DeliveryBatch,
    range: std::ops::Range<usize>,
) -> (SeenState, Option<DeliveryError>) {
    for item in &batch.items[range] {
        match store.commit(state.clone(), item) {
            Ok(next) => state = next,
            Err(e) => return (state, Some(e.into())),
        }
    }
    (state, None)
}

/// Send `batch` through `sink`, committing to `store` per `timing`.
#[instrument(level = "info", skip_all, fields(units = batch.units.len(), items = batch.items.len(), ?timing))]
pub async fn execute<S: MessageSink>(
    batch: &DeliveryBatch,
    sink: &S,
    store: &mut dyn SeenStore,
    state: SeenState,
    timing: CommitTiming,
) -> DeliveryReport {
    let total_count = batch.units.len();
    let mut report = DeliveryReport {
        sent_count: 0,
        total_count,
        state,
        last_error: None,
    };

    for (i, unit) in batch.units.iter().enumerate() {
        if let Err(e) = sink.send(&unit.text).await {
            error!(unit = i, sent = report.sent_count, total = total_count, error = %e, "Send failed; stopping");
            report.last_error = Some(e.into());
            return report;
        }
        report.sent_count += 1;

        if timing == CommitTiming::PerItem {
            let (state, err) = commit_range(store, report.state, batch, unit.items.clone());
            report.state = state;
            if let Some(e) = err {
                error!(unit = i, error = %e, "Commit failed after send; stopping");
                report.last_error = Some(e);
                return report;
            }
            if let Some(last) = unit.items.clone().last() {
                info!(identity = %batch.items[last].identity, state = %report.state.describe(), "Sent and committed");
            }
        }
    }

    if timing == CommitTiming::EndOfBatch && total_count > 0 {
        let (state, err) = commit_range(store, report.state, batch, 0..batch.items.len());
        report.state = state;
        if let Some(e) = err {
            error!(error = %e, "Commit failed after batch was sent");
            report.last_error = Some(e);
            return report;
        }
        info!(state = %report.state.describe(), "Batch sent; state committed");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeliveryConfig, Policy};
    use crate::plan::plan;
    use crate::sink::test_support::RecordingSink;
    use crate::store::seen_set::SqliteSeenSet;
    use crate::store::test_support::item;
    use crate::store::watermark::WatermarkFile;
    use crate::store::Watermark;
    use std::collections::HashSet;

    fn delivery(grouping: GroupingMode, budget: usize) -> DeliveryConfig {
        DeliveryConfig {
            grouping,
            policy: Policy::Incremental,
            chunk_budget: budget,
            label: "X".into(),
        }
    }

    async fn run_once(
        store: &mut dyn SeenStore,
        sink: &RecordingSink,
        seqs: &[u64],
        delivery: &DeliveryConfig,
    ) -> DeliveryReport {
        let state = store.load();
        let batch = plan(seqs.iter().copied().map(item).collect(), &state, delivery);
        execute(&batch, sink, store, state, CommitTiming::for_grouping(delivery.grouping)).await
    }

    #[tokio::test]
    async fn test_per_item_commit_ends_at_last_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WatermarkFile::new(dir.path().join("s.json"), Policy::Incremental);
        let sink = RecordingSink::default();
        let report = run_once(&mut store, &sink, &[5, 6, 7], &delivery(GroupingMode::Single, 3900)).await;

        assert_eq!((report.sent_count, report.total_count), (3, 3));
        assert!(report.last_error.is_none());
        assert_eq!(report.state, SeenState::Watermark(Watermark::advanced_to(&item(7))));
        assert_eq!(sink.sent.borrow().len(), 3);
    }

    #[tokio::test]
    async fn test_per_item_failure_resumes_without_loss_or_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let single = delivery(GroupingMode::Single, 3900);

        let mut store = WatermarkFile::new(&path, Policy::Incremental);
        let failing = RecordingSink::failing_at(2);
        let report = run_once(&mut store, &failing, &[1, 2, 3, 4, 5], &single).await;
        assert_eq!((report.sent_count, report.total_count), (2, 5));
        assert!(report.into_result().is_err());

        let mut store = WatermarkFile::new(&path, Policy::Incremental);
        let healthy = RecordingSink::default();
        let report = run_once(&mut store, &healthy, &[1, 2, 3, 4, 5, 6], &single).await;
        assert_eq!(report.sent_count, 4);
        let resent: Vec<String> = healthy.sent.borrow().clone();
        assert!(resent[0].contains("entry 3"));
        assert!(resent.iter().all(|m| !m.contains("entry 1<") && !m.contains("entry 2<")));
    }

    #[tokio::test]
    async fn test_end_of_batch_failure_resends_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let list = delivery(GroupingMode::ChunkedList, 120);
        let seqs: Vec<u64> = (1..=8).collect();

        let mut store = WatermarkFile::new(&path, Policy::Incremental);
        let failing = RecordingSink::failing_at(1);
        let report = run_once(&mut store, &failing, &seqs, &list).await;
        assert!(report.total_count > 2);
        assert_eq!(report.sent_count, 1);
        assert_eq!(report.state, SeenState::Watermark(Watermark::default()));

        let mut store = WatermarkFile::new(&path, Policy::Incremental);
        let healthy = RecordingSink::default();
        let report = run_once(&mut store, &healthy, &seqs, &list).await;
        assert_eq!(report.sent_count, report.total_count);
        assert_eq!(healthy.sent.borrow()[0], failing.sent.borrow()[0]);
        assert_eq!(report.state, SeenState::Watermark(Watermark::advanced_to(&item(8))));
    }

    #[tokio::test]
    async fn test_end_of_batch_commits_every_item_to_seen_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteSeenSet::new(dir.path().join("s.sqlite"), Policy::Incremental);
        let sink = RecordingSink::default();
        let report = run_once(&mut store, &sink, &[3, 1, 2], &delivery(GroupingMode::ChunkedList, 3900)).await;

        assert_eq!((report.sent_count, report.total_count), (1, 1));
        let expected: HashSet<_> = [1, 2, 3].into_iter().map(|s| item(s).identity).collect();
        assert_eq!(report.state, SeenState::Set(expected));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WatermarkFile::new(dir.path().join("s.json"), Policy::Incremental);
        let sink = RecordingSink::default();
        let report = run_once(&mut store, &sink, &[], &delivery(GroupingMode::ChunkedList, 3900)).await;
        assert_eq!((report.sent_count, report.total_count), (0, 0));
        assert!(sink.sent.borrow().is_empty());
        assert!(!dir.path().join("s.json").exists());
    }
}
