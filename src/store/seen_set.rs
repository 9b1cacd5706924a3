//! Seen-set backend: every delivered identity in an SQLite table.
//!
//! Each commit runs in its own transaction with `synchronous = FULL`, so a
//! returned commit survives a crash. A database that cannot be read is moved
//! aside and replaced by an empty one.

use super::{SeenState, SeenStore};
use crate::config::Policy;
use crate::error::StoreError;
use crate::models::{CandidateItem, Identity};
use crate::utils::ensure_state_dir;
use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS seen_items (
    identity    TEXT PRIMARY KEY,
    sequence    INTEGER,
    recorded_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS relay_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

#[derive(Debug)]
pub struct SqliteSeenSet {
    path: PathBuf,
    policy: Policy,
    retention: Option<Duration>,
    conn: Option<Connection>,
    recorded: Option<Policy>,
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl SqliteSeenSet {
    pub fn new(path: impl Into<PathBuf>, policy: Policy) -> Self {
        Self {
            path: path.into(),
            policy,
            retention: None,
            conn: None,
            recorded: None,
        }
    }

    /// Drop rows older than `days` on every load.
    pub fn with_retention_days(mut self, days: Option<u32>) -> Self {
        self.retention = days.map(|d| Duration::days(i64::from(d)));
        self
    }

    fn open(&self) -> Result<Connection, StoreError> {
        ensure_state_dir(&self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    fn read_all(&self, conn: &Connection) -> Result<(HashSet<Identity>, Option<Policy>), StoreError> {
        if let Some(retention) = self.retention {
            let cutoff = (Utc::now() - retention).to_rfc3339_opts(SecondsFormat::Secs, true);
            let pruned = conn.execute("DELETE FROM seen_items WHERE recorded_at < ?1", params![cutoff])?;
            if pruned > 0 {
                info!(pruned, %cutoff, "Pruned expired seen identities");
            }
        }

        let mut stmt = conn.prepare("SELECT identity, sequence FROM seen_items")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let sequence: Option<i64> = row.get(1)?;
            Ok(Identity {
                sequence: sequence.and_then(|s| u64::try_from(s).ok()),
                key,
            })
        })?;
        let mut seen = HashSet::new();
        for row in rows {
            seen.insert(row?);
        }

        let policy: Option<String> = conn
            .query_row("SELECT value FROM relay_meta WHERE key = 'policy'", [], |row| row.get(0))
            .optional()?;
        Ok((seen, policy.and_then(|p| p.parse().ok())))
    }

    /// Move an unreadable database out of the way and start a fresh one.
    fn quarantine(&self) -> Option<Connection> {
        let aside = self.path.with_extension("corrupt");
        if let Err(e) = std::fs::rename(&self.path, &aside) {
            warn!(error = %e, "Could not move corrupt seen-set database aside");
            return None;
        }
        warn!(moved_to = %aside.display(), "Corrupt seen-set database moved aside");
        self.open().ok()
    }

    fn connection(&mut self) -> Result<&mut Connection, StoreError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(self.conn.insert(conn))
    }
}

impl SeenStore for SqliteSeenSet {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    fn load(&mut self) -> SeenState {
        let loaded = self
            .open()
            .and_then(|conn| self.read_all(&conn).map(|read| (conn, read)));
        let (seen, recorded) = match loaded {
            Ok((conn, (seen, recorded))) => {
                self.conn = Some(conn);
                (seen, recorded)
            }
            Err(e) => {
                warn!(error = %e, "Unreadable seen-set database; starting empty");
                self.conn = self.quarantine();
                (HashSet::new(), None)
            }
        };
        self.recorded = recorded;
        info!(seen = seen.len(), "Loaded seen-set");
        SeenState::Set(seen)
    }

    fn commit(&mut self, state: SeenState, item: &CandidateItem) -> Result<SeenState, StoreError> {
        let mut seen = match state {
            SeenState::Set(seen) => seen,
            SeenState::Watermark(_) => HashSet::new(),
        };
        let policy = self.policy.to_string();
        let sequence = item.identity.sequence.and_then(|s| i64::try_from(s).ok());
        let conn = self.connection()?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO seen_items (identity, sequence, recorded_at) VALUES (?1, ?2, ?3)",
            params![item.identity.key, sequence, now_stamp()],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO relay_meta (key, value) VALUES ('policy', ?1)",
            params![policy],
        )?;
        tx.commit()?;
        debug!(identity = %item.identity, inserted = inserted > 0, "Recorded identity as seen");

        self.recorded.get_or_insert(self.policy);
        seen.insert(item.identity.clone());
        Ok(SeenState::Set(seen))
    }

    fn recorded_policy(&self) -> Option<Policy> {
        self.recorded
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
