//! Delivery planning: which items go out this run, and in which messages.

use crate::config::{DeliveryConfig, Policy};
use crate::format::{list_header, list_line, single_message};
use crate::models::{CandidateItem, DeliveryBatch, DeliveryUnit, GroupingMode};
use crate::store::SeenState;
use std::ops::Range;
use tracing::{info, instrument, warn};

/// Default character budget for one list message, under Telegram's 4096.
pub const DEFAULT_CHUNK_BUDGET: usize = 3900;

/// Filter `items` down to what this run must deliver, preserving order.
pub fn select(items: Vec<CandidateItem>, state: &SeenState, policy: Policy) -> Vec<CandidateItem> {
    match policy {
        Policy::Incremental => items.into_iter().filter(|i| state.is_new(i)).collect(),
        Policy::FullBatch => items,
    }
}

/// Cut `header` to `budget` characters without leaving half an HTML entity.
fn fit_header(header: &str, budget: usize) -> String {
    if header.chars().count() <= budget {
        return header.to_string();
    }
    warn!(chars = header.chars().count(), budget, "List header exceeds chunk budget; cutting it");
    let mut cut: String = header.chars().take(budget).collect();
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut
}

/// Pack `lines` into as few messages as fit in `budget` characters.
///
/// The first message starts with `header`. Lines are joined with `\n` and a
/// line is never split. A single line longer than the budget is sent alone.
/// Each returned range holds the indices of the lines in that message.
pub fn chunk_lines(header: &str, lines: &[String], budget: usize) -> Vec<(String, Range<usize>)> {
    let mut chunks = Vec::new();
    let mut current = fit_header(header, budget);
    let mut current_len = current.chars().count();
    let mut start = 0;

    for (i, line) in lines.iter().enumerate() {
        let line_len = line.chars().count();
        let sep = usize::from(current_len > 0);
        if current_len > 0 && current_len + sep + line_len > budget {
            chunks.push((std::mem::take(&mut current), start..i));
            current_len = 0;
            start = i;
        }
        if line_len > budget {
            warn!(chars = line_len, budget, "Line exceeds chunk budget; sending it alone");
        }
        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if current_len > 0 {
        chunks.push((current, start..lines.len()));
    }
    chunks
}

/// Build the batch for this run. An empty result is a valid, free no-op.
#[instrument(level = "info", skip_all, fields(candidates = items.len(), policy = %delivery.policy))]
pub fn plan(items: Vec<CandidateItem>, state: &SeenState, delivery: &DeliveryConfig) -> DeliveryBatch {
    let items = select(items, state, delivery.policy);
    if items.is_empty() {
        info!("Nothing to deliver");
        return DeliveryBatch::empty(delivery.grouping);
    }

    let units = match delivery.grouping {
        GroupingMode::Single => items
            .iter()
            .enumerate()
            .map(|(i, item)| DeliveryUnit {
                text: single_message(item),
                items: i..i + 1,
            })
            .collect(),
        GroupingMode::ChunkedList => {
            let header = list_header(&delivery.label, items.len());
            let lines: Vec<String> = items.iter().map(list_line).collect();
            chunk_lines(&header, &lines, delivery.chunk_budget)
                .into_iter()
                .map(|(text, items)| DeliveryUnit { text, items })
                .collect()
        }
    };

    let batch = DeliveryBatch {
        grouping: delivery.grouping,
        items,
        units,
    };
    info!(items = batch.items.len(), units = batch.units.len(), "Planned delivery");
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::item;
    use crate::store::Watermark;
    use std::collections::HashSet;

    fn delivery(grouping: GroupingMode, policy: Policy) -> DeliveryConfig {
        DeliveryConfig {
            grouping,
            policy,
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            label: "X".into(),
        }
    }

    fn seqs(batch: &DeliveryBatch) -> Vec<u64> {
        batch
            .items
            .iter()
            .filter_map(|i| i.identity.sequence)
            .collect()
    }

    #[test]
    fn test_empty_state_delivers_everything_in_order() {
        let state = SeenState::Watermark(Watermark::default());
        let batch = plan(
            vec![item(5), item(6), item(7)],
            &state,
            &delivery(GroupingMode::Single, Policy::Incremental),
        );
        assert_eq!(seqs(&batch), vec![5, 6, 7]);
        assert_eq!(batch.units.len(), 3);
        assert_eq!(batch.units[2].items, 2..3);
    }

    #[test]
    fn test_incremental_skips_up_to_watermark() {
        let state = SeenState::Watermark(Watermark::advanced_to(&item(6)));
        let batch = plan(
            vec![item(5), item(6), item(7), item(8)],
            &state,
            &delivery(GroupingMode::Single, Policy::Incremental),
        );
        assert_eq!(seqs(&batch), vec![7, 8]);
    }

    #[test]
    fn test_full_batch_ignores_state() {
        let seen: HashSet<_> = [5, 6, 7].into_iter().map(|s| item(s).identity).collect();
        let state = SeenState::Set(seen);
        let batch = plan(
            vec![item(5), item(6), item(7)],
            &state,
            &delivery(GroupingMode::Single, Policy::FullBatch),
        );
        assert_eq!(seqs(&batch), vec![5, 6, 7]);
    }

    #[test]
    fn test_nothing_new_is_empty_batch() {
        let state = SeenState::Watermark(Watermark::advanced_to(&item(9)));
        let batch = plan(
            vec![item(5), item(9)],
            &state,
            &delivery(GroupingMode::ChunkedList, Policy::Incremental),
        );
        assert!(batch.is_empty());
        assert!(batch.units.is_empty());
    }

    #[test]
    fn test_short_list_fits_one_message() {
        let state = SeenState::Watermark(Watermark::default());
        let batch = plan(
            vec![item(1), item(2), item(3)],
            &state,
            &delivery(GroupingMode::ChunkedList, Policy::Incremental),
        );
        assert_eq!(batch.units.len(), 1);
        let text = &batch.units[0].text;
        assert!(text.starts_with("X: 3 new\n"));
        assert_eq!(text.lines().count(), 4);
        assert_eq!(batch.units[0].items, 0..3);
    }

    #[test]
    fn test_chunking_never_splits_lines_or_exceeds_budget() {
        let header = "Header: 40 new".to_string();
        let lines: Vec<String> = (0..40)
            .map(|i| format!("• line {i} {}", "x".repeat(i * 3 % 50)))
            .collect();
        let budget = 200;
        let chunks = chunk_lines(&header, &lines, budget);

        assert!(chunks.len() > 1);
        for (text, _) in &chunks {
            assert!(text.chars().count() <= budget, "{text}");
        }
        assert!(chunks[0].0.starts_with(&header));
        let rebuilt: Vec<&str> = chunks
            .iter()
            .flat_map(|(text, _)| text.lines())
            .skip(1)
            .collect();
        let expected: Vec<&str> = lines.iter().map(String::as_str).collect();
        assert_eq!(rebuilt, expected);

        let mut next = 0;
        for (_, range) in &chunks {
            assert_eq!(range.start, next);
            next = range.end;
        }
        assert_eq!(next, lines.len());
    }

    #[test]
    fn test_oversized_header_is_cut_to_budget() {
        let header = format!("{}&amp;{}", "h".repeat(8), "t".repeat(20));
        let lines = vec!["aaaa".to_string(), "bbbb".to_string()];
        let chunks = chunk_lines(&header, &lines, 10);
        assert_eq!(chunks[0].0, "hhhhhhhh");
        for (text, _) in &chunks {
            assert!(text.chars().count() <= 10, "{text}");
        }
        let covered: usize = chunks.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(covered, lines.len());
    }

    #[test]
    fn test_chunking_packs_greedily() {
        let lines = vec!["aaaa".to_string(), "bbbb".to_string(), "cccc".to_string()];
        let chunks = chunk_lines("H", &lines, 10);
        let texts: Vec<&str> = chunks.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["H\naaaa", "bbbb\ncccc"]);
        assert_eq!(chunks[1].1, 1..3);
    }
}
