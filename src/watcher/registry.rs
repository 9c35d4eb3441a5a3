//! Persisted seen-set for the remote ingest watcher.
//!
//! A JSON snapshot of the object names already ingested, loaded once at
//! startup and re-saved on each append. The cutoff time is fixed at
//! construction and never persisted.

use crate::error::{PrompterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Persisted registry state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistrySnapshot {
    #[serde(default)]
    seen_files: Vec<String>,
}

/// Append-only record of ingested object names plus the ingestion cutoff.
#[derive(Debug)]
pub struct SeenRegistry {
    seen: HashSet<String>,
    /// Objects whose derived creation time is strictly earlier are ignored.
    cutoff: Option<DateTime<Utc>>,
    state_path: PathBuf,
}

impl SeenRegistry {
    /// Load the registry from `state_path`, tolerating a missing or corrupt
    /// snapshot (either starts an empty set).
    #[must_use]
    pub fn load(state_path: &Path, cutoff: Option<DateTime<Utc>>) -> Self {
        let seen = match std::fs::read_to_string(state_path) {
            Ok(raw) => match serde_json::from_str::<RegistrySnapshot>(&raw) {
                Ok(snapshot) => {
                    info!(
                        "loaded {} previously seen files from {}",
                        snapshot.seen_files.len(),
                        state_path.display()
                    );
                    snapshot.seen_files.into_iter().collect()
                }
                Err(e) => {
                    warn!("cannot parse seen-set snapshot, starting empty: {e}");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };

        Self {
            seen,
            cutoff,
            state_path: state_path.to_path_buf(),
        }
    }

    /// Whether `name` has already been ingested.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// The configured ingestion cutoff, if any.
    #[must_use]
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.cutoff
    }

    /// Number of recorded names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no names have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Record a successfully ingested name and persist the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a persist error if the snapshot cannot be written; the
    /// in-memory set is updated regardless.
    pub fn record(&mut self, name: &str) -> Result<()> {
        self.seen.insert(name.to_owned());
        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut seen_files: Vec<String> = self.seen.iter().cloned().collect();
        seen_files.sort();
        let snapshot = RegistrySnapshot { seen_files };

        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrompterError::Persist(format!("cannot create state dir: {e}")))?;
        }
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| PrompterError::Persist(format!("cannot serialize seen set: {e}")))?;
        std::fs::write(&self.state_path, raw)
            .map_err(|e| PrompterError::Persist(format!("cannot write seen set: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SeenRegistry::load(&dir.path().join("none.json"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let registry = SeenRegistry::load(&path, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn record_round_trips_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut registry = SeenRegistry::load(&path, None);
        registry.record("shot_20250101_090000.png").unwrap();
        registry.record("shot_20250102_100000.png").unwrap();

        let reloaded = SeenRegistry::load(&path, None);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("shot_20250101_090000.png"));
        assert!(reloaded.contains("shot_20250102_100000.png"));
        assert!(!reloaded.contains("shot_20250103_110000.png"));
    }
}
