//! Baseline diff: the changes that bring one tree in line with the other

use serde::{Deserialize, Serialize};

use crate::indexer::{FileRecord, Snapshot};

/// One change to apply to the destination tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeItem {
    /// File exists on source and not on destination
    Create { key: String, record: FileRecord },
    /// Source holds a newer version than destination
    Modify { key: String, record: FileRecord },
    /// Source deleted a file the destination still has
    Delete { key: String },
}

impl ChangeItem {
    pub fn key(&self) -> &str {
        match self {
            ChangeItem::Create { key, .. } => key,
            ChangeItem::Modify { key, .. } => key,
            ChangeItem::Delete { key } => key,
        }
    }
}

/// Counts per change kind for one computed diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub creates: usize,
    pub modifies: usize,
    pub deletes: usize,
}

impl DiffSummary {
    pub fn of(items: &[ChangeItem]) -> Self {
        let mut summary = Self::default();
        for item in items {
            match item {
                ChangeItem::Create { .. } => summary.creates += 1,
                ChangeItem::Modify { .. } => summary.modifies += 1,
                ChangeItem::Delete { .. } => summary.deletes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.creates + self.modifies + self.deletes
    }
}

/// Compute the change list for one direction (source to dest).
///
/// Pure function over four snapshots. Deletions are detected against the
/// baseline (a bare listing cannot see them): a key the source held at the
/// last run but no longer does is deleted, and propagates only while the
/// destination still has the file. Version comparison is strict greater-than;
/// equal versions never produce a change, so two mirrored trees settle to an
/// empty diff. `overwrite` bypasses the version comparison only.
pub fn compute(
    current_source: &Snapshot,
    current_dest: &Snapshot,
    baseline_source: &Snapshot,
    baseline_dest: &Snapshot,
    overwrite: bool,
) -> Vec<ChangeItem> {
    let mut items = Vec::new();

    // Source-side deletions since the last run
    for key in baseline_source.keys() {
        if current_source.contains_key(key) {
            continue;
        }
        if current_dest.contains_key(key) {
            items.push(ChangeItem::Delete { key: key.clone() });
        }
        // Gone from both sides: already consistent, nothing to emit. The
        // stale baseline entry is swept at the end of a successful run.
    }

    // Creations and modifications
    for (key, record) in current_source {
        match current_dest.get(key) {
            None => {
                // The destination had this key at the last run and deleted it
                // since; the opposite direction owns that delete.
                if baseline_dest.contains_key(key) {
                    continue;
                }
                items.push(ChangeItem::Create {
                    key: key.clone(),
                    record: record.clone(),
                });
            }
            Some(dest_record) => {
                if record.version > dest_record.version || overwrite {
                    items.push(ChangeItem::Modify {
                        key: key.clone(),
                        record: record.clone(),
                    });
                }
            }
        }
    }

    items
}
