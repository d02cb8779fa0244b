//! Tree indexing: walks a directory and produces a keyed snapshot

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::SyncSettings;
use crate::error::{Result, SyncError};
use crate::filter::PathFilter;

/// One tracked file inside a tree. Identity is the relative key the record is
/// stored under; `version` is the modification time in milliseconds and the
/// sole staleness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time, milliseconds since the Unix epoch
    pub version: i64,
    /// Absolute path of the file
    pub path: PathBuf,
    /// Relative containing directory ("" for the tree root)
    pub dir: String,
}

/// Complete listing of one tree at one moment: relative key to record.
/// Ordered so persisted state serializes deterministically.
pub type Snapshot = BTreeMap<String, FileRecord>;

/// Walks a tree and returns the snapshot of files that pass the filter.
#[derive(Debug, Clone)]
pub struct FileIndexer {
    filter: PathFilter,
}

impl FileIndexer {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        Ok(Self::new(PathFilter::from_settings(settings)?))
    }

    /// Index a tree. Fails only when the root itself is missing or
    /// unreadable; individual entries that cannot be read are logged and
    /// skipped so one bad file does not hide the rest of the tree.
    pub async fn index<P: AsRef<Path>>(&self, root_path: P) -> Result<Snapshot> {
        let root_path = root_path.as_ref();

        if !root_path.exists() {
            return Err(SyncError::scan_error(root_path, "Directory does not exist"));
        }
        if !root_path.is_dir() {
            return Err(SyncError::scan_error(root_path, "Path is not a directory"));
        }

        let mut snapshot = Snapshot::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .into_iter()
            // Prune ignored directory names before descending into them
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                match entry.file_name().to_str() {
                    Some(name) => !self.filter.skip_dir(name),
                    None => true,
                }
            });

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SyncError::scan_error(
                        root_path,
                        format!("Walk error: {}", e),
                    ));
                }
                Err(e) => {
                    warn!(root = %root_path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let rel = match entry.path().strip_prefix(root_path) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let key = rel.to_string_lossy().replace('\\', "/");

            if !self.filter.matches(&key) {
                continue;
            }

            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            let record = FileRecord {
                version: version_from_mtime(&metadata),
                path: entry.path().to_path_buf(),
                dir: containing_dir(&key),
            };
            snapshot.insert(key, record);
        }

        Ok(snapshot)
    }
}

/// Modification time in milliseconds since the Unix epoch, 0 when the
/// filesystem cannot report one.
pub fn version_from_mtime(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Relative containing directory of a slash-separated key.
pub fn containing_dir(key: &str) -> String {
    match key.rfind('/') {
        Some(idx) => key[..idx].to_string(),
        None => String::new(),
    }
}
