//! Per-tree polling watcher: detects creates, modifies, and deletes between
//! ticks and emits them as typed events

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::indexer::{FileIndexer, FileRecord, Snapshot};

/// Bounded wait for an in-flight tick when pausing
const TICK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Kind of an observed change. The single-letter codes are the wire contract
/// consumers key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "m")]
    Modify,
    #[serde(rename = "d")]
    Delete,
}

/// One observed change on a watched tree. Delete events carry the last
/// tracked record of the vanished file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub key: String,
    pub path: PathBuf,
    pub dir: String,
    pub version: i64,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, key: impl Into<String>, record: &FileRecord) -> Self {
        Self {
            kind,
            key: key.into(),
            path: record.path.clone(),
            dir: record.dir.clone(),
            version: record.version,
        }
    }

    /// The file record this event describes.
    pub fn record(&self) -> FileRecord {
        FileRecord {
            version: self.version,
            path: self.path.clone(),
            dir: self.dir.clone(),
        }
    }
}

/// Lifecycle of a watcher. `Stopped` is terminal; a stopped watcher is
/// replaced, not restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Initializing,
    Active,
    Paused,
    Stopped,
}

struct WatcherShared {
    paused: AtomicBool,
    /// One-shot: the next tick re-baselines without emitting
    resync: AtomicBool,
    init_done: AtomicBool,
    tick_active: AtomicBool,
    tick_done: Notify,
    cancel: CancellationToken,
}

impl WatcherShared {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            resync: AtomicBool::new(false),
            init_done: AtomicBool::new(false),
            tick_active: AtomicBool::new(false),
            tick_done: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Polls one tree on a fixed interval and emits [`ChangeEvent`]s.
///
/// The first listing establishes the tracked baseline silently. While paused
/// the listing keeps running and the tracked state keeps advancing, so no
/// backlog accumulates; resuming forces one more silent tick, which folds
/// everything that landed in between (the sync engine's own writes included)
/// into a single re-baselining pass instead of replaying it.
pub struct FolderWatcher {
    label: String,
    root: PathBuf,
    poll_interval: Duration,
    indexer: FileIndexer,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
    shared: Arc<WatcherShared>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FolderWatcher {
    pub fn new(
        label: impl Into<String>,
        root: impl Into<PathBuf>,
        poll_interval: Duration,
        indexer: FileIndexer,
        events_tx: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Self {
        Self {
            label: label.into(),
            root: root.into(),
            poll_interval,
            indexer,
            events_tx,
            shared: Arc::new(WatcherShared::new()),
            task: None,
        }
    }

    /// Spawn the polling loop. A watcher runs at most once.
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!(watcher = %self.label, "Watcher is already running");
            return;
        }
        if self.shared.cancel.is_cancelled() {
            warn!(watcher = %self.label, "A stopped watcher cannot be restarted");
            return;
        }

        let label = self.label.clone();
        let root = self.root.clone();
        let indexer = self.indexer.clone();
        let poll_interval = self.poll_interval;
        let events_tx = self.events_tx.clone();
        let shared = Arc::clone(&self.shared);

        self.task = Some(tokio::spawn(async move {
            run_loop(label, root, indexer, poll_interval, events_tx, shared).await;
        }));
    }

    /// Suspend event emission. Waits out any in-flight tick, with a bounded
    /// timeout so a hung listing cannot wedge the caller.
    pub async fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);

        // Register the waiter before checking the flag, otherwise a tick
        // finishing in between would slip past unnoticed.
        let tick_done = self.shared.tick_done.notified();
        tokio::pin!(tick_done);
        tick_done.as_mut().enable();

        if self.shared.tick_active.load(Ordering::SeqCst)
            && tokio::time::timeout(TICK_WAIT_TIMEOUT, tick_done).await.is_err()
        {
            warn!(watcher = %self.label, "Timed out waiting for the in-flight tick");
        }

        debug!(watcher = %self.label, "Watcher paused");
    }

    /// Resume event emission. The next tick re-baselines silently, so a
    /// pause/resume cycle coalesces instead of replaying.
    pub fn resume(&self) {
        // The resync flag must be visible before the paused flag clears
        self.shared.resync.store(true, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        debug!(watcher = %self.label, "Watcher resumed");
    }

    /// Stop the loop at the next tick boundary and wait for it to exit.
    pub async fn stop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(watcher = %self.label, error = %e, "Watcher task ended abnormally");
                }
            }
        }
        debug!(watcher = %self.label, "Watcher stopped");
    }

    pub fn state(&self) -> WatcherState {
        if self.shared.cancel.is_cancelled() || self.task.is_none() {
            WatcherState::Stopped
        } else if self.shared.paused.load(Ordering::SeqCst) {
            WatcherState::Paused
        } else if !self.shared.init_done.load(Ordering::SeqCst) {
            WatcherState::Initializing
        } else {
            WatcherState::Active
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

async fn run_loop(
    label: String,
    root: PathBuf,
    indexer: FileIndexer,
    poll_interval: Duration,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
    shared: Arc<WatcherShared>,
) {
    info!(watcher = %label, root = %root.display(), "Watcher starting");

    let mut tracked = Snapshot::new();

    // Establish the baseline before the first sleep
    tick(&label, &root, &indexer, &events_tx, &shared, &mut tracked).await;

    let mut ticker = tokio::time::interval(poll_interval);
    // interval() completes its first tick immediately, swallow it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        shared.tick_active.store(true, Ordering::SeqCst);
        tick(&label, &root, &indexer, &events_tx, &shared, &mut tracked).await;
        shared.tick_active.store(false, Ordering::SeqCst);
        shared.tick_done.notify_waiters();
    }

    info!(watcher = %label, "Watcher loop exited");
}

async fn tick(
    label: &str,
    root: &Path,
    indexer: &FileIndexer,
    events_tx: &mpsc::UnboundedSender<ChangeEvent>,
    shared: &WatcherShared,
    tracked: &mut Snapshot,
) {
    let snapshot = match indexer.index(root).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(watcher = %label, error = %e, "Listing failed, skipping tick");
            return;
        }
    };

    if !shared.init_done.load(Ordering::SeqCst) {
        *tracked = snapshot;
        shared.init_done.store(true, Ordering::SeqCst);
        debug!(watcher = %label, files = tracked.len(), "Initial listing complete");
        return;
    }

    // While paused the resync flag stays untouched, so the short-circuit
    // below leaves it armed for the first tick after resume.
    let silent = shared.paused.load(Ordering::SeqCst) || shared.resync.swap(false, Ordering::SeqCst);

    if silent {
        *tracked = snapshot;
        return;
    }

    emit_changes(label, events_tx, tracked, &snapshot);
    *tracked = snapshot;
}

fn emit_changes(
    label: &str,
    events_tx: &mpsc::UnboundedSender<ChangeEvent>,
    tracked: &Snapshot,
    current: &Snapshot,
) {
    for (key, record) in current {
        match tracked.get(key) {
            None => {
                debug!(watcher = %label, key, version = record.version, "Observed create");
                let _ = events_tx.send(ChangeEvent::new(ChangeKind::Create, key, record));
            }
            Some(old) if old.version != record.version => {
                debug!(
                    watcher = %label,
                    key,
                    old_version = old.version,
                    new_version = record.version,
                    "Observed modify"
                );
                let _ = events_tx.send(ChangeEvent::new(ChangeKind::Modify, key, record));
            }
            Some(_) => {}
        }
    }

    for (key, record) in tracked {
        if !current.contains_key(key) {
            debug!(watcher = %label, key, "Observed delete");
            let _ = events_tx.send(ChangeEvent::new(ChangeKind::Delete, key, record));
        }
    }
}
