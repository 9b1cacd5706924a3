//! Durable record of what has already been delivered.
//!
//! Two interchangeable backends implement [`SeenStore`]:
//!
//! | Backend | Module | State | Storage |
//! |---------|--------|-------|---------|
//! | Watermark | [`watermark`] | last `(timestamp, identity)` | one JSON file |
//! | Seen-set | [`seen_set`] | every delivered identity | SQLite table |
//!
//! The rest of the pipeline only sees [`SeenState`] and the `load`/`commit`
//! pair. `load` never fails: missing or unreadable storage yields the empty
//! state. `commit` returns only once the new state is durable.

pub mod seen_set;
pub mod watermark;

use crate::config::Policy;
use crate::error::{ConfigError, StoreError};
use crate::models::{CandidateItem, Identity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Single cursor marking the last delivered position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_occurred_at: Option<DateTime<Utc>>,
    pub last_identity: Option<Identity>,
}

impl Watermark {
    /// True iff `item` sits strictly after this watermark.
    pub fn admits(&self, item: &CandidateItem) -> bool {
        let Some(last_identity) = &self.last_identity else {
            return true;
        };
        let last_at = self.last_occurred_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
        item.position() > (last_at, last_identity)
    }

    pub fn advanced_to(item: &CandidateItem) -> Self {
        Self {
            last_occurred_at: item.occurred_at,
            last_identity: Some(item.identity.clone()),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self
            .last_occurred_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        match &self.last_identity {
            Some(id) => write!(f, "{at} / {id}"),
            None => f.write_str("empty"),
        }
    }
}

/// Loaded delivery progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenState {
    Watermark(Watermark),
    Set(HashSet<Identity>),
}

impl SeenState {
    /// Pure predicate: has `item` not been delivered yet?
    pub fn is_new(&self, item: &CandidateItem) -> bool {
        match self {
            SeenState::Watermark(w) => w.admits(item),
            SeenState::Set(seen) => !seen.contains(&item.identity),
        }
    }

    /// Short operator-facing description for the run summary.
    pub fn describe(&self) -> String {
        match self {
            SeenState::Watermark(w) => format!("watermark {w}"),
            SeenState::Set(seen) => format!("{} seen identities", seen.len()),
        }
    }
}

/// Persistence contract shared by both backends.
pub trait SeenStore {
    /// Read the persisted state. Never fails; falls back to empty.
    fn load(&mut self) -> SeenState;

    /// Record `item` as delivered and return the updated state.
    ///
    /// Idempotent for the set backend; for the watermark backend a
    /// commit that would not move the cursor forward is a no-op.
    fn commit(&mut self, state: SeenState, item: &CandidateItem) -> Result<SeenState, StoreError>;

    /// Policy the stored progress was written under, if any was recorded.
    fn recorded_policy(&self) -> Option<Policy>;

    /// Where the state lives, for log lines and error messages.
    fn location(&self) -> String;
}

/// Refuse to reuse state that was written under a different policy.
pub fn check_policy(store: &dyn SeenStore, configured: Policy) -> Result<(), ConfigError> {
    match store.recorded_policy() {
        Some(stored) if stored != configured => Err(ConfigError::PolicyMismatch {
            path: store.location(),
            stored: stored.to_string(),
            configured: configured.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{CandidateItem, Identity};
    use chrono::{TimeZone, Utc};

    /// Item with a sequence identity and a timestamp `seq` minutes past a fixed epoch.
    pub fn item(seq: u64) -> CandidateItem {
        CandidateItem {
            identity: Identity::sequence(seq),
            occurred_at: Some(
                Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
                    + chrono::Duration::minutes(seq as i64),
            ),
            title: format!("entry {seq}"),
            body: None,
            link: format!("https://example.com/{seq}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::item;
    use super::*;

    #[test]
    fn test_empty_watermark_admits_everything() {
        let w = Watermark::default();
        assert!(w.admits(&item(0)));
        let mut undated = item(1);
        undated.occurred_at = None;
        assert!(w.admits(&undated));
    }

    #[test]
    fn test_watermark_filters_at_and_before_cursor() {
        let state = SeenState::Watermark(Watermark::advanced_to(&item(6)));
        let new: Vec<_> = [5, 6, 7, 8]
            .into_iter()
            .map(item)
            .filter(|i| state.is_new(i))
            .map(|i| i.identity.sequence)
            .collect();
        assert_eq!(new, vec![Some(7), Some(8)]);
    }

    #[test]
    fn test_equal_timestamp_breaks_tie_on_identity() {
        let w = Watermark::advanced_to(&item(6));
        let mut same_time_higher_id = item(7);
        same_time_higher_id.occurred_at = item(6).occurred_at;
        let mut same_time_lower_id = item(5);
        same_time_lower_id.occurred_at = item(6).occurred_at;
        assert!(w.admits(&same_time_higher_id));
        assert!(!w.admits(&same_time_lower_id));
    }

    #[test]
    fn test_set_membership() {
        let state = SeenState::Set([Identity::sequence(1)].into_iter().collect());
        assert!(!state.is_new(&item(1)));
        assert!(state.is_new(&item(2)));
    }
}
