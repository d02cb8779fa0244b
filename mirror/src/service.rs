//! Service facade: two folder watchers feeding a queue, one worker draining
//! it. At most one sync executes at a time; the worker pauses the watchers on
//! whichever sides a run writes to, and resumes them afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncSettings;
use crate::engine::{SyncDirection, SyncEngine, SyncMode};
use crate::error::{Result, SyncError};
use crate::indexer::FileIndexer;
use crate::queue::{SubmitOutcome, SyncCommand, SyncQueue, SyncReceiver};
use crate::watcher::{ChangeEvent, FolderWatcher};

struct WatcherSet {
    local: Option<FolderWatcher>,
    remote: Option<FolderWatcher>,
}

/// Owns the full sync lifecycle for one folder pair.
///
/// `start` brings up the worker and both watchers and queues an initial
/// two-way sync so the trees converge before live events are trusted. A
/// rejected sync folder disables the service until the settings are
/// corrected; nothing here terminates the host process.
pub struct SyncService {
    settings: SyncSettings,
    enabled: Arc<AtomicBool>,
    queue: SyncQueue,
    receiver: Option<SyncReceiver>,
    watchers: Arc<RwLock<WatcherSet>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl SyncService {
    pub fn new(settings: SyncSettings) -> Self {
        let (queue, receiver) = SyncQueue::new();
        Self {
            enabled: Arc::new(AtomicBool::new(settings.enabled)),
            settings,
            queue,
            receiver: Some(receiver),
            watchers: Arc::new(RwLock::new(WatcherSet {
                local: None,
                remote: None,
            })),
            worker: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Start the worker and watchers, then queue the initial two-way sync.
    pub async fn start(&mut self) -> Result<()> {
        if !self.is_enabled() {
            info!("Sync is disabled, service stays idle");
            return Ok(());
        }
        self.ensure_ready()?;

        let receiver = match self.receiver.take() {
            Some(receiver) => receiver,
            None => {
                warn!("Sync service is already started");
                return Ok(());
            }
        };

        let engine = SyncEngine::new(self.settings.clone());
        let watchers = Arc::clone(&self.watchers);
        let enabled = Arc::clone(&self.enabled);
        let cancel = self.cancel.clone();
        self.worker = Some(tokio::spawn(async move {
            worker_loop(engine, receiver, watchers, enabled, cancel).await;
        }));

        self.start_watchers().await?;
        self.request_sync(SyncMode::Both, false)?;

        Ok(())
    }

    /// Queue a full sync. An identical pending request coalesces.
    pub fn request_sync(&self, mode: SyncMode, overwrite: bool) -> Result<SubmitOutcome> {
        self.ensure_ready()?;

        let outcome = self.queue.submit(SyncCommand::Full { mode, overwrite })?;
        if outcome == SubmitOutcome::Coalesced {
            info!(?mode, "Sync already pending");
        }
        Ok(outcome)
    }

    /// Create and start both watchers, replacing any previous pair.
    pub async fn start_watchers(&self) -> Result<()> {
        let indexer = FileIndexer::from_settings(&self.settings)?;
        let mut set = self.watchers.write().await;

        if let Some(mut old) = set.local.take() {
            old.stop().await;
        }
        if let Some(mut old) = set.remote.take() {
            old.stop().await;
        }

        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let mut local = FolderWatcher::new(
            "local",
            &self.settings.local_folder,
            self.settings.poll_interval,
            indexer.clone(),
            local_tx,
        );
        local.start();
        spawn_event_pump(SyncDirection::Push, local_rx, self.queue.clone());

        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let mut remote = FolderWatcher::new(
            "remote",
            &self.settings.sync_folder,
            self.settings.poll_interval,
            indexer,
            remote_tx,
        );
        remote.start();
        spawn_event_pump(SyncDirection::Pull, remote_rx, self.queue.clone());

        set.local = Some(local);
        set.remote = Some(remote);
        info!("Watchers started");
        Ok(())
    }

    pub async fn stop_watchers(&self) {
        let mut set = self.watchers.write().await;
        if let Some(mut watcher) = set.local.take() {
            watcher.stop().await;
        }
        if let Some(mut watcher) = set.remote.take() {
            watcher.stop().await;
        }
        info!("Watchers stopped");
    }

    pub async fn pause_watchers(&self, local: bool, remote: bool) {
        pause_watchers_in(&self.watchers, local, remote).await;
    }

    pub async fn resume_watchers(&self, local: bool, remote: bool) {
        resume_watchers_in(&self.watchers, local, remote).await;
    }

    /// Stop the worker and the watchers. In-flight work finishes first.
    pub async fn shutdown(&mut self) {
        info!("Shutting down sync service");
        self.cancel.cancel();
        self.stop_watchers().await;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Sync worker ended abnormally");
                }
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.is_enabled() {
            return Err(SyncError::config_error("sync is disabled"));
        }
        if let Err(e) = self.settings.validate() {
            error!(error = %e, "Invalid sync folder, disabling sync until the settings are corrected");
            self.enabled.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}

fn spawn_event_pump(
    direction: SyncDirection,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    queue: SyncQueue,
) {
    // Lives exactly as long as the watcher feeding it
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?direction, key = %event.key, kind = ?event.kind, "Watcher event");
            if let Err(e) = queue.submit(SyncCommand::Item { direction, event }) {
                debug!(error = %e, "Sync queue closed, stopping event pump");
                break;
            }
        }
    });
}

async fn worker_loop(
    engine: SyncEngine,
    mut receiver: SyncReceiver,
    watchers: Arc<RwLock<WatcherSet>>,
    enabled: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    info!("Sync worker started");

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = receiver.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        if !enabled.load(Ordering::SeqCst) {
            debug!("Sync is disabled, dropping queued command");
            continue;
        }

        match command {
            SyncCommand::Full { mode, overwrite } => {
                let (local, remote) = sides_written(mode);
                pause_watchers_in(&watchers, local, remote).await;
                match engine.run(mode, overwrite).await {
                    Ok(report) => info!(
                        run_id = %report.run_id,
                        applied = report.applied,
                        deleted = report.deleted,
                        echo_skipped = report.echo_skipped,
                        failed = report.failed,
                        "Full sync finished"
                    ),
                    Err(SyncError::Config { message }) => {
                        error!(%message, "Sync folder rejected, disabling sync");
                        enabled.store(false, Ordering::SeqCst);
                    }
                    Err(e) => warn!(error = %e, "Full sync failed"),
                }
                resume_watchers_in(&watchers, local, remote).await;
            }
            SyncCommand::Item { direction, event } => {
                let (local, remote) = match direction {
                    SyncDirection::Pull => (true, false),
                    SyncDirection::Push => (false, true),
                };
                pause_watchers_in(&watchers, local, remote).await;
                match engine.apply_event(direction, &event).await {
                    Ok(outcome) => {
                        debug!(key = %event.key, ?outcome, "Item sync finished")
                    }
                    Err(SyncError::Config { message }) => {
                        error!(%message, "Sync folder rejected, disabling sync");
                        enabled.store(false, Ordering::SeqCst);
                    }
                    Err(e) => warn!(key = %event.key, error = %e, "Item sync failed"),
                }
                resume_watchers_in(&watchers, local, remote).await;
            }
        }
    }

    info!("Sync worker exited");
}

/// Which trees a run in this mode writes to: pull writes the local side,
/// push writes the remote side.
fn sides_written(mode: SyncMode) -> (bool, bool) {
    match mode {
        SyncMode::Pull => (true, false),
        SyncMode::Push => (false, true),
        SyncMode::Both => (true, true),
    }
}

async fn pause_watchers_in(watchers: &RwLock<WatcherSet>, local: bool, remote: bool) {
    let set = watchers.read().await;
    if local {
        if let Some(watcher) = &set.local {
            watcher.pause().await;
        }
    }
    if remote {
        if let Some(watcher) = &set.remote {
            watcher.pause().await;
        }
    }
}

async fn resume_watchers_in(watchers: &RwLock<WatcherSet>, local: bool, remote: bool) {
    let set = watchers.read().await;
    if local {
        if let Some(watcher) = &set.local {
            watcher.resume();
        }
    }
    if remote {
        if let Some(watcher) = &set.remote {
            watcher.resume();
        }
    }
}
