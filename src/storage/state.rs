//! Persisted tuning state.
//!
//! The whole numeric state of the loop lives in one JSON document that is
//! read at the start of a round and rewritten at the end. Persistence is
//! best-effort by policy: a missing or corrupt document loads as the empty
//! default (cold start), and a failed write is logged and swallowed so the
//! round that produced it still returns its result.
//!
//! There is no locking. Two processes sharing a state path race, and the
//! last writer wins; callers that need multi-process safety must serialize
//! access themselves.

use crate::error::StateError;
use crate::evaluation::{DimensionState, PlateauPolicy, StatsState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything that survives between rounds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Selector state per dimension
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionState>,

    /// Reporting buckets
    #[serde(default)]
    pub stats: StatsState,

    /// Recent 0/1 round outcomes feeding plateau detection
    #[serde(default)]
    pub outcomes: Vec<u8>,

    /// Adapted exploration policy; absent until the first adaptation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PlateauPolicy>,

    /// Completed rounds
    #[serde(default)]
    pub rounds: u64,

    /// Rubric in force when the state was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,

    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_adapt: Option<DateTime<Utc>>,
}

/// Best-effort reader/writer for the state document
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

    /// Load the state, degrading to the empty default on any failure.
    pub fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(state)) => {
                debug!(
                    "Loaded state from {} ({} rounds)",
                    self.path.display(),
                    state.rounds
                );
                state
            }
            Ok(None) => {
                debug!("No state at {}; starting cold", self.path.display());
                PersistedState::default()
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable state at {} ({}); starting cold",
                    self.path.display(),
                    e
                );
                PersistedState::default()
            }
        }
    }

    /// Strict load: `Ok(None)` when the file does not exist.
    pub fn try_load(&self) -> Result<Option<PersistedState>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(&self.path)?;
        let state = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(state))
    }

    /// Write the state, logging and swallowing any failure.
    pub fn save(&self, state: &PersistedState) {
        match self.try_save(state) {
            Ok(()) => debug!("Saved state to {}", self.path.display()),
            Err(e) => warn!(
                "Failed to persist state to {} ({}); next round may start cold",
                self.path.display(),
                e
            ),
        }
    }

    /// Strict save, creating parent directories as needed.
    pub fn try_save(&self, state: &PersistedState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        Ok(())
    }

    /// Discard the persisted state. Returns whether a file was removed.
    pub fn reset(&self) -> Result<bool, StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ArmState;
    use tempfile::TempDir;

    fn sample_state() -> PersistedState {
        let mut dimensions = BTreeMap::new();
        dimensions.insert(
            "plan".to_string(),
            DimensionState {
                t: 3,
                arms: vec![
                    ArmState { id: Some("direct".into()), count: 2, value: 1.234_567_890_123 },
                    ArmState { id: Some("two_step".into()), count: 1, value: -0.1 },
                ],
            },
        );
        PersistedState {
            dimensions,
            outcomes: vec![1, 0, 1],
            policy: Some(PlateauPolicy::default()),
            rounds: 3,
            rubric: Some("2*pass".to_string()),
            ts: Some(Utc::now()),
            ..PersistedState::default()
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("trace").join("state.json"));

        let state = sample_state();
        store.save(&state);
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nope.json"));
        assert_eq!(store.try_load().unwrap(), None);
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn test_truncated_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let full = serde_json::to_string(&sample_state()).unwrap();
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.try_load(), Err(StateError::Corrupt(_))));
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // parent is a regular file, so create_dir_all fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = StateStore::new(blocker.join("state.json"));

        store.save(&sample_state());
        assert!(store.try_save(&sample_state()).is_err());
        assert_eq!(store.load(), PersistedState::default());
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(!store.reset().unwrap());
        store.save(&sample_state());
        assert!(store.reset().unwrap());
        assert_eq!(store.load(), PersistedState::default());
    }
}
