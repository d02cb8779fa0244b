//! Mirror Sync Library
//!
//! A bidirectional two-folder mirror synchronization engine providing:
//! - Snapshot indexing with glob include/ignore filtering
//! - Baseline diffing with delete propagation and echo suppression
//! - Periodic polling watchers with pause/resume coalescing
//! - Crash-tolerant persisted sync state
//! - A queue-backed service enforcing one sync at a time

pub mod config;
pub mod filter;
pub mod indexer;
pub mod diff;
pub mod state;
pub mod executor;
pub mod engine;
pub mod watcher;
pub mod queue;
pub mod service;
pub mod error;

// Re-export main types and functions
pub use config::{SyncSettings, CONFIG_FILE_NAME, STATE_FILE_NAME};
pub use filter::PathFilter;
pub use indexer::{FileIndexer, FileRecord, Snapshot};
pub use diff::{ChangeItem, DiffSummary};
pub use state::{StateStore, SyncState};
pub use executor::{ApplyOutcome, SyncExecutor};
pub use engine::{RunReport, SyncDirection, SyncEngine, SyncMode};
pub use watcher::{ChangeEvent, ChangeKind, FolderWatcher, WatcherState};
pub use queue::{SubmitOutcome, SyncCommand, SyncQueue, SyncReceiver, SyncSignature};
pub use service::SyncService;
pub use error::{Result, SyncError};

/// Run one full sync of the folder pair in the given mode.
pub async fn sync_folders(
    settings: SyncSettings,
    mode: SyncMode,
    overwrite: bool,
) -> Result<RunReport> {
    let engine = SyncEngine::new(settings);
    engine.run(mode, overwrite).await
}

/// Index one folder into a snapshot using the settings' filters.
pub async fn index_folder(
    root: impl AsRef<std::path::Path>,
    settings: &SyncSettings,
) -> Result<Snapshot> {
    let indexer = FileIndexer::from_settings(settings)?;
    indexer.index(root.as_ref()).await
}

// Test modules
#[cfg(test)]
mod diff_property_tests;
