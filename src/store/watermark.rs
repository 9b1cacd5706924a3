//! Watermark backend: one JSON file holding the last delivered position.
//!
//! ```json
//! {"policy":"incremental","last_occurred_at":"2024-05-01T10:07:00Z","last_identity":{"sequence":7,"key":"7"}}
//! ```
//!
//! Writes go to a sibling temp file which is fsynced and renamed over the
//! real one, so a crash leaves either the old or the new watermark.

use super::{SeenState, SeenStore, Watermark};
use crate::config::Policy;
use crate::error::StoreError;
use crate::models::CandidateItem;
use crate::utils::{ensure_state_dir, sync_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkFileContents {
    #[serde(default)]
    policy: Option<Policy>,
    #[serde(flatten)]
    watermark: Watermark,
}

#[derive(Debug)]
pub struct WatermarkFile {
    path: PathBuf,
    policy: Policy,
    recorded: Option<Policy>,
    current: Watermark,
}

impl WatermarkFile {
    pub fn new(path: impl Into<PathBuf>, policy: Policy) -> Self {
        Self {
            path: path.into(),
            policy,
            recorded: None,
            current: Watermark::default(),
        }
    }

    fn read(path: &Path) -> Option<WatermarkFileContents> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No watermark file yet");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable watermark file; starting empty");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(contents) => Some(contents),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt watermark file; starting empty");
                None
            }
        }
    }

    fn write(&self, watermark: &Watermark) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let contents = WatermarkFileContents {
            policy: Some(self.policy),
            watermark: watermark.clone(),
        };
        let json = serde_json::to_vec(&contents)?;

        ensure_state_dir(&self.path).map_err(io_err)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        sync_dir(&self.path).map_err(io_err)?;
        Ok(())
    }
}

impl SeenStore for WatermarkFile {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    fn load(&mut self) -> SeenState {
        if let Err(e) = ensure_state_dir(&self.path) {
            warn!(error = %e, "Could not create state directory");
        }
        let contents = Self::read(&self.path);
        self.recorded = contents.as_ref().and_then(|c| c.policy);
        self.current = contents.map(|c| c.watermark).unwrap_or_default();
        info!(watermark = %self.current, "Loaded watermark");
        SeenState::Watermark(self.current.clone())
    }

    fn commit(&mut self, state: SeenState, item: &CandidateItem) -> Result<SeenState, StoreError> {
        let current = match state {
            SeenState::Watermark(w) => w,
            SeenState::Set(_) => self.current.clone(),
        };
        if !current.admits(item) {
            debug!(identity = %item.identity, watermark = %current, "Commit would not advance watermark; skipping");
            return Ok(SeenState::Watermark(current));
        }
        let next = Watermark::advanced_to(item);
        self.write(&next)?;
        debug!(watermark = %next, "Watermark advanced");
        self.current = next.clone();
        self.recorded = Some(self.policy);
        Ok(SeenState::Watermark(next))
    }

    fn recorded_policy(&self) -> Option<Policy> {
        self.recorded
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
