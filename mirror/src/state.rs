//! Persistence for the last-known-state baseline

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::STATE_TMP_SUFFIX;
use crate::error::{Result, SyncError};
use crate::indexer::Snapshot;

/// The persisted baseline pair: what both trees looked like after the last
/// successful sync. This is the reference point that makes deletions visible
/// to a later diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub last_local_data: Snapshot,
    #[serde(default)]
    pub last_remote_data: Snapshot,

    /// Stamped on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    /// Top-level keys this version does not know about ride along unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Loads and saves [`SyncState`] at a fixed path.
///
/// Loading never fails: a missing file is the first-ever run and corrupt
/// content degrades to an empty baseline with a warning, so the worst case is
/// one redundant full copy rather than a dead engine. Saving goes through a
/// temp sibling and a rename so a crash cannot leave a half-written file.
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

    pub async fn load(&self) -> SyncState {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "State file is corrupt, starting from an empty baseline"
                    );
                    SyncState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, starting from an empty baseline");
                SyncState::default()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is unreadable, starting from an empty baseline"
                );
                SyncState::default()
            }
        }
    }

    pub async fn save(&self, state: &SyncState) -> Result<()> {
        // Read-merge-write: unknown top-level keys already in the file
        // survive, ours win on conflict.
        let on_disk = self.load().await;
        let mut merged = state.clone();
        for (key, value) in on_disk.extra {
            merged.extra.entry(key).or_insert(value);
        }
        merged.saved_at = Some(Utc::now());

        let content = serde_json::to_string_pretty(&merged)?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, content).await.map_err(|e| {
            SyncError::state_error(&tmp_path, format!("Failed to write state: {}", e))
        })?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            SyncError::state_error(&self.path, format!("Failed to replace state file: {}", e))
        })?;

        Ok(())
    }

    // Must stay in step with the implicit ignore in effective_file_ignores,
    // otherwise a watcher tick can index the scratch file mid-save.
    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(STATE_TMP_SUFFIX);
        PathBuf::from(name)
    }
}
