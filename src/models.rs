//! Data models shared by every pipeline stage.
//!
//! - [`RawRecord`]: one unvalidated record as produced by a source
//! - [`Identity`]: the opaque, orderable deduplication key of an item
//! - [`CandidateItem`]: a validated, trimmed item ready for planning
//! - [`DeliveryBatch`]: the items chosen for this run plus the message units
//!   that carry them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A raw record as extracted by a source, before any validation.
///
/// Every field is optional and untrimmed. Sources map their own schema onto
/// these fields; the normalizer decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Source-provided identifier (entry id, guid, URL).
    pub id: Option<String>,
    /// Monotonic sequence number, when the source has one.
    pub sequence: Option<u64>,
    /// Timestamp text in RFC 3339 or RFC 2822 form.
    pub occurred_at: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub body: Option<String>,
}

/// Stable deduplication key of an item.
///
/// Ordering compares the sequence number first (absent sorts before present)
/// and the key text second. Sources with monotonic ids always populate
/// `sequence`, so for them the order is numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub key: String,
}

impl Identity {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            sequence: None,
            key: key.into(),
        }
    }

    pub fn sequence(seq: u64) -> Self {
        Self {
            sequence: Some(seq),
            key: seq.to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// A validated item. `identity`, `title` and `link` are never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub identity: Identity,
    pub occurred_at: Option<DateTime<Utc>>,
    pub title: String,
    pub body: Option<String>,
    pub link: String,
}

impl CandidateItem {
    /// Watermark position of this item: time dominates, identity breaks ties.
    /// A missing timestamp sorts before any real one.
    pub fn position(&self) -> (DateTime<Utc>, &Identity) {
        (
            self.occurred_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
            &self.identity,
        )
    }
}

/// How planned items are grouped into outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingMode {
    /// One message per item.
    Single,
    /// All items rendered as lines and packed into as few messages as fit.
    ChunkedList,
}

/// One physical message and the slice of batch items it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUnit {
    pub text: String,
    pub items: Range<usize>,
}

/// The ordered items chosen for delivery in this run and their messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryBatch {
    pub grouping: GroupingMode,
    pub items: Vec<CandidateItem>,
    pub units: Vec<DeliveryUnit>,
}

impl DeliveryBatch {
    pub fn empty(grouping: GroupingMode) -> Self {
        Self {
            grouping,
            items: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
