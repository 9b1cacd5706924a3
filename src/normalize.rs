//! Item normalization: raw source records to validated [`CandidateItem`]s.
//!
//! Records missing an identity, title or link (after trimming) are dropped
//! without error. The survivors are ordered per source and deduplicated by a
//! stable key, keeping the first occurrence in sorted order.

use crate::models::{CandidateItem, Identity, RawRecord};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info, instrument};

/// Output ordering applied before deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending by identity; used when the source has monotonic ids.
    Identity,
    /// Ascending by timestamp, but only if every item carries one.
    /// Otherwise the source order is kept.
    Timestamp,
    /// Keep the order the source produced.
    Source,
}

/// Which field decides that two items in one fetch are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    Link,
    Identity,
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeRules {
    pub order: SortOrder,
    pub dedup: DedupKey,
}

/// Parse a source timestamp. RFC 3339 first, then RFC 2822.
///
/// ThingSpeak and Atom use RFC 3339; RSS `pubDate` uses RFC 2822.
///
/// # Returns
///
/// The instant in UTC, or `None` for blank or unparseable text. Callers treat
/// `None` as "no timestamp" rather than as an error.
///
/// # Examples
///
/// ```ignore
/// assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
/// assert!(parse_timestamp("Wed, 01 May 2024 10:00:00 GMT").is_some());
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Validate one record.
///
/// # Arguments
///
/// * `raw` - A record as produced by a source
///
/// # Returns
///
/// `None` when the title, the link, or both the sequence and id are missing
/// or blank after trimming. A sequence number wins over a text id. An
/// unparseable timestamp becomes `None` without rejecting the record.
pub fn to_candidate(raw: RawRecord) -> Option<CandidateItem> {
    let title = non_empty(raw.title)?;
    let link = non_empty(raw.link)?;
    let identity = match (raw.sequence, non_empty(raw.id)) {
        (Some(seq), _) => Identity::sequence(seq),
        (None, Some(key)) => Identity::key(key),
        (None, None) => return None,
    };
    Some(CandidateItem {
        identity,
        occurred_at: raw.occurred_at.as_deref().and_then(parse_timestamp),
        title,
        body: non_empty(raw.body),
        link,
    })
}

/// Turn a raw fetch batch into an ordered, deduplicated list of items.
#[instrument(level = "info", skip_all, fields(raw = raw.len()))]
pub fn normalize(raw: Vec<RawRecord>, rules: NormalizeRules) -> Vec<CandidateItem> {
    let raw_count = raw.len();
    let mut items: Vec<CandidateItem> = raw
        .into_iter()
        .filter_map(|r| {
            let candidate = to_candidate(r.clone());
            if candidate.is_none() {
                debug!(id = ?r.id, sequence = ?r.sequence, "Dropping malformed record");
            }
            candidate
        })
        .collect();
    let valid = items.len();

    match rules.order {
        SortOrder::Identity => items.sort_by(|a, b| a.identity.cmp(&b.identity)),
        SortOrder::Timestamp => {
            if items.iter().all(|i| i.occurred_at.is_some()) {
                items.sort_by(|a, b| a.position().cmp(&b.position()));
            }
        }
        SortOrder::Source => {}
    }

    let items: Vec<CandidateItem> = match rules.dedup {
        DedupKey::Link => items.into_iter().unique_by(|i| i.link.clone()).collect(),
        DedupKey::Identity => items
            .into_iter()
            .unique_by(|i| i.identity.clone())
            .collect(),
    };

    info!(
        raw = raw_count,
        malformed = raw_count - valid,
        duplicates = valid - items.len(),
        kept = items.len(),
        "Normalized fetch batch"
    );
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(seq: u64, title: &str, link: &str) -> RawRecord {
        RawRecord {
            id: None,
            sequence: Some(seq),
            occurred_at: Some("2024-05-01T10:00:00Z".into()),
            title: Some(title.into()),
            link: Some(link.into()),
            body: None,
        }
    }

    const BY_ID: NormalizeRules = NormalizeRules {
        order: SortOrder::Identity,
        dedup: DedupKey::Link,
    };

    #[test]
    fn test_drops_records_missing_required_fields() {
        let raw = vec![
            rec(1, "  ", "https://a"),
            rec(2, "ok", ""),
            RawRecord {
                sequence: None,
                id: Some("   ".into()),
                ..rec(3, "t", "https://c")
            },
            rec(4, " kept ", " https://d "),
        ];
        let items = normalize(raw, BY_ID);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "kept");
        assert_eq!(items[0].link, "https://d");
    }

    #[test]
    fn test_sorts_by_sequence_ascending() {
        let raw = vec![rec(7, "c", "https://c"), rec(5, "a", "https://a"), rec(6, "b", "https://b")];
        let ids: Vec<_> = normalize(raw, BY_ID)
            .into_iter()
            .map(|i| i.identity.sequence)
            .collect();
        assert_eq!(ids, vec![Some(5), Some(6), Some(7)]);
    }

    #[test]
    fn test_same_link_keeps_first_in_sort_order() {
        let raw = vec![rec(9, "later", "https://same"), rec(3, "earlier", "https://same")];
        let items = normalize(raw, BY_ID);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identity, Identity::sequence(3));
        assert_eq!(items[0].title, "earlier");
    }

    #[test]
    fn test_timestamp_order_falls_back_to_source_order_when_incomplete() {
        let mut a = rec(1, "a", "https://a");
        a.sequence = None;
        a.id = Some("a".into());
        a.occurred_at = Some("Wed, 01 May 2024 12:00:00 +0000".into());
        let mut b = a.clone();
        b.id = Some("b".into());
        b.link = Some("https://b".into());
        b.occurred_at = Some("2024-05-01T09:00:00Z".into());
        let rules = NormalizeRules {
            order: SortOrder::Timestamp,
            dedup: DedupKey::Identity,
        };

        let sorted = normalize(vec![a.clone(), b.clone()], rules);
        assert_eq!(sorted[0].identity.key, "b");

        b.occurred_at = Some("not a date".into());
        let kept = normalize(vec![a, b], rules);
        assert_eq!(kept[0].identity.key, "a");
        assert!(kept[1].occurred_at.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("Wed, 01 May 2024 10:00:00 GMT").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
