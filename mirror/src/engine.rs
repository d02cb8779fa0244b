//! Full-run sync orchestration: index both trees, diff against the baseline,
//! apply, persist the advanced baseline

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::diff::{self, ChangeItem, DiffSummary};
use crate::error::Result;
use crate::executor::{ApplyOutcome, SyncExecutor};
use crate::indexer::{FileIndexer, Snapshot};
use crate::state::{StateStore, SyncState};
use crate::watcher::{ChangeEvent, ChangeKind};

/// Which full-sync legs to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Remote to local
    Pull,
    /// Local to remote
    Push,
    /// Pull, then push
    Both,
}

/// One leg of a sync: which tree is the source of truth for this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Pull,
    Push,
}

/// Counters for one completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub overwrite: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Files copied into place (creates and modifies)
    pub applied: usize,
    /// Files removed
    pub deleted: usize,
    /// Items suppressed because the baseline already held that exact version
    pub echo_skipped: usize,
    /// Items that hit an I/O error and were skipped
    pub failed: usize,
}

impl RunReport {
    fn begin(run_id: Uuid, mode: SyncMode, overwrite: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            mode,
            overwrite,
            started_at: now,
            finished_at: now,
            applied: 0,
            deleted: 0,
            echo_skipped: 0,
            failed: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn total_changes(&self) -> usize {
        self.applied + self.deleted
    }
}

/// Runs full syncs and single-item syncs against one settings value.
///
/// Each run re-indexes the trees it touches, loads the persisted baseline,
/// diffs, applies with per-item failure tolerance, and writes the advanced
/// baseline back in one atomic save at the end.
pub struct SyncEngine {
    settings: SyncSettings,
    store: StateStore,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings) -> Self {
        let store = StateStore::new(settings.state_file_path());
        Self { settings, store }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run a full sync in the given mode.
    pub async fn run(&self, mode: SyncMode, overwrite: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, mode, overwrite).await
    }

    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn run_inner(&self, run_id: Uuid, mode: SyncMode, overwrite: bool) -> Result<RunReport> {
        self.settings.validate()?;

        info!(
            local = %self.settings.local_folder.display(),
            remote = %self.settings.sync_folder.display(),
            "Starting sync run"
        );

        let indexer = FileIndexer::from_settings(&self.settings)?;
        let mut state = self.store.load().await;
        let mut report = RunReport::begin(run_id, mode, overwrite);

        let (current_local, current_remote) = match mode {
            SyncMode::Pull => {
                let (source, dest) = self
                    .run_leg(SyncDirection::Pull, overwrite, &indexer, &mut state, &mut report)
                    .await?;
                (dest, source)
            }
            SyncMode::Push => {
                self.run_leg(SyncDirection::Push, overwrite, &indexer, &mut state, &mut report)
                    .await?
            }
            SyncMode::Both => {
                self.run_leg(SyncDirection::Pull, overwrite, &indexer, &mut state, &mut report)
                    .await?;
                // The push leg indexes fresh so it sees what the pull leg wrote
                self.run_leg(SyncDirection::Push, overwrite, &indexer, &mut state, &mut report)
                    .await?
            }
        };

        reconcile_baselines(&mut state, &current_local, &current_remote);
        self.store.save(&state).await?;

        report.finished_at = Utc::now();
        info!(
            applied = report.applied,
            deleted = report.deleted,
            echo_skipped = report.echo_skipped,
            failed = report.failed,
            "Sync run finished"
        );

        Ok(report)
    }

    async fn run_leg(
        &self,
        direction: SyncDirection,
        overwrite: bool,
        indexer: &FileIndexer,
        state: &mut SyncState,
        report: &mut RunReport,
    ) -> Result<(Snapshot, Snapshot)> {
        let (source_root, dest_root) = self.roots(direction);

        let current_source = indexer.index(source_root).await?;
        let current_dest = indexer.index(dest_root).await?;

        let (baseline_source, baseline_dest) = match direction {
            SyncDirection::Pull => (&state.last_remote_data, &state.last_local_data),
            SyncDirection::Push => (&state.last_local_data, &state.last_remote_data),
        };

        let items = diff::compute(
            &current_source,
            &current_dest,
            baseline_source,
            baseline_dest,
            overwrite,
        );
        let summary = DiffSummary::of(&items);
        info!(
            ?direction,
            creates = summary.creates,
            modifies = summary.modifies,
            deletes = summary.deletes,
            "Computed change list"
        );

        let executor = SyncExecutor::new(dest_root);
        for item in &items {
            let (baseline_source, baseline_dest) = match direction {
                SyncDirection::Pull => (&mut state.last_remote_data, &mut state.last_local_data),
                SyncDirection::Push => (&mut state.last_local_data, &mut state.last_remote_data),
            };
            match executor.apply(item, baseline_source, baseline_dest).await {
                Ok(ApplyOutcome::Applied) => match item {
                    ChangeItem::Delete { .. } => report.deleted += 1,
                    _ => report.applied += 1,
                },
                Ok(ApplyOutcome::EchoSkipped) => report.echo_skipped += 1,
                Err(e) => {
                    warn!(key = item.key(), error = %e, "Failed to apply change, continuing");
                    report.failed += 1;
                }
            }
        }

        Ok((current_source, current_dest))
    }

    /// Apply one watcher event in the given direction, bypassing the full
    /// diff. The baseline is saved immediately after an applied change.
    #[instrument(skip(self, event), fields(key = %event.key, kind = ?event.kind))]
    pub async fn apply_event(
        &self,
        direction: SyncDirection,
        event: &ChangeEvent,
    ) -> Result<ApplyOutcome> {
        self.settings.validate()?;

        let (_, dest_root) = self.roots(direction);
        let mut state = self.store.load().await;

        let item = match event.kind {
            ChangeKind::Create => ChangeItem::Create {
                key: event.key.clone(),
                record: event.record(),
            },
            ChangeKind::Modify => ChangeItem::Modify {
                key: event.key.clone(),
                record: event.record(),
            },
            ChangeKind::Delete => ChangeItem::Delete {
                key: event.key.clone(),
            },
        };

        let executor = SyncExecutor::new(dest_root);
        let (baseline_source, baseline_dest) = match direction {
            SyncDirection::Pull => (&mut state.last_remote_data, &mut state.last_local_data),
            SyncDirection::Push => (&mut state.last_local_data, &mut state.last_remote_data),
        };
        let outcome = executor
            .apply(&item, baseline_source, baseline_dest)
            .await?;

        if outcome == ApplyOutcome::Applied {
            self.store.save(&state).await?;
        }

        Ok(outcome)
    }

    fn roots(&self, direction: SyncDirection) -> (&Path, &Path) {
        match direction {
            SyncDirection::Pull => (
                self.settings.sync_folder.as_path(),
                self.settings.local_folder.as_path(),
            ),
            SyncDirection::Push => (
                self.settings.local_folder.as_path(),
                self.settings.sync_folder.as_path(),
            ),
        }
    }
}

/// Fold the observed trees back into the baseline after a run.
///
/// Files sitting at the same version on both sides are recorded as synced
/// even when no item ever copied them, so a later one-sided delete still has
/// a baseline entry to propagate from. Entries for keys gone from both trees
/// are dropped: their deletes are suppressed rather than emitted, and without
/// the sweep those baseline entries would linger forever.
fn reconcile_baselines(state: &mut SyncState, current_local: &Snapshot, current_remote: &Snapshot) {
    for (key, local_record) in current_local {
        if let Some(remote_record) = current_remote.get(key) {
            if local_record.version == remote_record.version {
                state
                    .last_local_data
                    .insert(key.clone(), local_record.clone());
                state
                    .last_remote_data
                    .insert(key.clone(), remote_record.clone());
            }
        }
    }

    let keys: BTreeSet<String> = state
        .last_local_data
        .keys()
        .chain(state.last_remote_data.keys())
        .cloned()
        .collect();

    for key in keys {
        if current_local.contains_key(&key) || current_remote.contains_key(&key) {
            continue;
        }
        let in_local = state.last_local_data.remove(&key).is_some();
        let in_remote = state.last_remote_data.remove(&key).is_some();
        if in_local || in_remote {
            debug!(key, "Dropped baseline entry for a file gone from both trees");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::indexer::FileRecord;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn settings(local: &TempDir, remote: &TempDir) -> SyncSettings {
        SyncSettings {
            local_folder: local.path().to_path_buf(),
            sync_folder: remote.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_on_empty_trees_is_clean() {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();

        let engine = SyncEngine::new(settings(&local, &remote));
        let report = engine.run(SyncMode::Both, false).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report.total_changes(), 0);
        assert_eq!(report.echo_skipped, 0);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_settings() {
        let local = TempDir::new().unwrap();

        let broken = SyncSettings {
            local_folder: local.path().to_path_buf(),
            sync_folder: PathBuf::from("/missing/sync/folder"),
            ..Default::default()
        };
        let engine = SyncEngine::new(broken);

        let err = engine.run(SyncMode::Push, false).await.unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    fn record(version: i64, path: &str) -> FileRecord {
        FileRecord {
            version,
            path: PathBuf::from(path),
            dir: String::new(),
        }
    }

    #[test]
    fn test_reconcile_drops_keys_gone_from_both_trees() {
        let mut state = SyncState::default();
        state
            .last_local_data
            .insert("kept.txt".to_string(), record(1, "/l/kept.txt"));
        state
            .last_remote_data
            .insert("kept.txt".to_string(), record(1, "/r/kept.txt"));
        state
            .last_local_data
            .insert("stale.txt".to_string(), record(1, "/l/stale.txt"));
        state
            .last_remote_data
            .insert("stale.txt".to_string(), record(1, "/r/stale.txt"));

        let mut current_local = Snapshot::new();
        current_local.insert("kept.txt".to_string(), record(1, "/l/kept.txt"));
        let mut current_remote = Snapshot::new();
        current_remote.insert("kept.txt".to_string(), record(1, "/r/kept.txt"));

        reconcile_baselines(&mut state, &current_local, &current_remote);

        assert!(state.last_local_data.contains_key("kept.txt"));
        assert!(state.last_remote_data.contains_key("kept.txt"));
        assert!(!state.last_local_data.contains_key("stale.txt"));
        assert!(!state.last_remote_data.contains_key("stale.txt"));
    }

    #[test]
    fn test_reconcile_seeds_files_already_equal_on_both_sides() {
        let mut state = SyncState::default();

        let mut current_local = Snapshot::new();
        current_local.insert("same.txt".to_string(), record(7, "/l/same.txt"));
        current_local.insert("diverged.txt".to_string(), record(9, "/l/diverged.txt"));
        let mut current_remote = Snapshot::new();
        current_remote.insert("same.txt".to_string(), record(7, "/r/same.txt"));
        current_remote.insert("diverged.txt".to_string(), record(3, "/r/diverged.txt"));

        reconcile_baselines(&mut state, &current_local, &current_remote);

        // Equal versions are recorded as synced, each side keeping its own path
        assert_eq!(state.last_local_data["same.txt"].version, 7);
        assert_eq!(
            state.last_local_data["same.txt"].path,
            PathBuf::from("/l/same.txt")
        );
        assert_eq!(
            state.last_remote_data["same.txt"].path,
            PathBuf::from("/r/same.txt")
        );

        // Diverged versions stay out of the baseline
        assert!(!state.last_local_data.contains_key("diverged.txt"));
        assert!(!state.last_remote_data.contains_key("diverged.txt"));
    }
}
