//! Position book persistence.
//!
//! The book is written as a single JSON document after every pass that
//! changed it. Writes go to a sibling temp file which is then renamed over
//! the target, so a crash mid-write leaves the previous state intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trailbot_core::domain::PortfolioSnapshot;
use trailbot_core::position_management::PositionBook;

/// Current on-disk format version.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state file version {found} is newer than supported version {STATE_VERSION}")]
    UnsupportedVersion { found: u32 },

    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub positions: PositionBook,
    #[serde(default)]
    pub portfolio: PortfolioSnapshot,
}

impl PersistedState {
    pub fn new(positions: PositionBook, portfolio: PortfolioSnapshot) -> Self {
        Self {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            positions,
            portfolio,
        }
    }
}

/// JSON file store for [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the persisted state. A missing file is a fresh start.
    pub fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let state: PersistedState =
            serde_json::from_str(&text).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
            });
        }
        Ok(Some(state))
    }

    /// Atomically replace the state file.
    pub fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.flush()?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.io_err(e)
        })?;

        tracing::debug!(
            path = %self.path.display(),
            positions = state.positions.len(),
            "state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trailbot_core::engine::NullSink;
    use trailbot_core::position_management::PositionTracker;

    fn book_with_positions() -> PositionBook {
        let mut tracker = PositionTracker::new(2.0).with_sink(Arc::new(NullSink));
        tracker.open("SOL/USDT", 100.0, 2.0, 3.0).unwrap();
        tracker.open("ADA/USDT", 0.5, 100.0, 0.01).unwrap();
        tracker.evaluate("SOL/USDT", 104.0);
        tracker.book().clone()
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_preserves_book() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("state.json"));
        let mut portfolio = PortfolioSnapshot::new();
        portfolio.observe_balance(250.0);
        let state = PersistedState::new(book_with_positions(), portfolio);

        store.save(&state).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(
            loaded.positions.get("SOL/USDT").unwrap().trailing_stop(),
            Some(98.0)
        );
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store
            .save(&PersistedState::new(book_with_positions(), PortfolioSnapshot::new()))
            .unwrap();
        store
            .save(&PersistedState::new(PositionBook::new(), PortfolioSnapshot::new()))
            .unwrap();
        assert!(store.load().unwrap().unwrap().positions.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = PersistedState::new(PositionBook::new(), PortfolioSnapshot::new());
        state.version = STATE_VERSION + 1;
        fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();
        assert!(matches!(
            StateStore::new(&path).load(),
            Err(StateError::UnsupportedVersion { .. })
        ));
    }
}
