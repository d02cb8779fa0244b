//! Applies change items to a destination tree

use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::fs;
use tracing::debug;

use crate::diff::ChangeItem;
use crate::error::{Result, SyncError};
use crate::indexer::{containing_dir, FileRecord, Snapshot};

/// Outcome of applying one change item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The destination tree was written
    Applied,
    /// The baseline already records this exact version on the destination,
    /// so the item is an echo of an earlier write by this engine
    EchoSkipped,
}

/// Applies change items under one destination root and keeps the baseline
/// pair in step with every applied change.
pub struct SyncExecutor {
    dest_root: PathBuf,
}

impl SyncExecutor {
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
        }
    }

    /// Apply one item. On success both baseline sides are updated, which is
    /// what stops the next poll from re-detecting this engine's own write.
    pub async fn apply(
        &self,
        item: &ChangeItem,
        baseline_source: &mut Snapshot,
        baseline_dest: &mut Snapshot,
    ) -> Result<ApplyOutcome> {
        match item {
            ChangeItem::Create { key, record } | ChangeItem::Modify { key, record } => {
                self.apply_copy(key, record, baseline_source, baseline_dest)
                    .await
            }
            ChangeItem::Delete { key } => {
                self.apply_delete(key, baseline_source, baseline_dest)
                    .await?;
                Ok(ApplyOutcome::Applied)
            }
        }
    }

    async fn apply_copy(
        &self,
        key: &str,
        record: &FileRecord,
        baseline_source: &mut Snapshot,
        baseline_dest: &mut Snapshot,
    ) -> Result<ApplyOutcome> {
        if let Some(existing) = baseline_dest.get(key) {
            if existing.version == record.version {
                debug!(
                    key,
                    version = record.version,
                    "Destination already holds this version, skipping echo"
                );
                return Ok(ApplyOutcome::EchoSkipped);
            }
        }

        let dest_path = self.dest_path(key);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::copy_error(
                    &record.path,
                    &dest_path,
                    format!("Failed to create directory: {}", e),
                )
            })?;
        }

        fs::copy(&record.path, &dest_path)
            .await
            .map_err(|e| SyncError::copy_error(&record.path, &dest_path, e.to_string()))?;

        // The copy must index back to exactly the source's version, otherwise
        // the next poll sees it as a fresh change.
        let mtime = FileTime::from_unix_time(
            record.version.div_euclid(1000),
            (record.version.rem_euclid(1000) * 1_000_000) as u32,
        );
        filetime::set_file_mtime(&dest_path, mtime).map_err(|e| {
            SyncError::copy_error(
                &record.path,
                &dest_path,
                format!("Failed to set modification time: {}", e),
            )
        })?;

        debug!(key, version = record.version, dest = %dest_path.display(), "Copied file");

        baseline_source.insert(key.to_string(), record.clone());
        baseline_dest.insert(
            key.to_string(),
            FileRecord {
                version: record.version,
                path: dest_path,
                dir: containing_dir(key),
            },
        );

        Ok(ApplyOutcome::Applied)
    }

    async fn apply_delete(
        &self,
        key: &str,
        baseline_source: &mut Snapshot,
        baseline_dest: &mut Snapshot,
    ) -> Result<()> {
        let dest_path = self.dest_path(key);

        match fs::remove_file(&dest_path).await {
            Ok(()) => {
                debug!(key, dest = %dest_path.display(), "Deleted file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Already consistent
                debug!(key, "Delete target already absent");
            }
            Err(e) => {
                return Err(SyncError::deletion_error(&dest_path, e.to_string()));
            }
        }

        self.prune_empty_dirs(&dest_path).await;

        baseline_source.remove(key);
        baseline_dest.remove(key);

        Ok(())
    }

    /// Remove now-empty directories left behind by a delete, walking from the
    /// file's parent up to but excluding the tree root. Best-effort: a
    /// directory that is non-empty, shared, or unreadable ends the walk.
    async fn prune_empty_dirs(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(current) = dir {
            if current == self.dest_root || !current.starts_with(&self.dest_root) {
                break;
            }
            match Self::dir_is_empty(current).await {
                Ok(true) => {
                    if fs::remove_dir(current).await.is_err() {
                        break;
                    }
                    debug!(path = %current.display(), "Pruned empty directory");
                }
                _ => break,
            }
            dir = current.parent();
        }
    }

    async fn dir_is_empty(path: &Path) -> std::io::Result<bool> {
        let mut entries = fs::read_dir(path).await?;
        Ok(entries.next_entry().await?.is_none())
    }

    fn dest_path(&self, key: &str) -> PathBuf {
        self.dest_root.join(Path::new(key))
    }
}
