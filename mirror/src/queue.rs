//! Pending-command queue. Full-run requests coalesce by signature; the
//! single consumer is what serializes sync execution.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{SyncDirection, SyncMode};
use crate::error::{Result, SyncError};
use crate::watcher::{ChangeEvent, ChangeKind};

/// A unit of sync work waiting for the worker.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// Diff and apply over the whole tree pair
    Full { mode: SyncMode, overwrite: bool },
    /// Apply one watcher event directly
    Item {
        direction: SyncDirection,
        event: ChangeEvent,
    },
}

impl SyncCommand {
    pub fn signature(&self) -> SyncSignature {
        match self {
            SyncCommand::Full { mode, overwrite } => SyncSignature::Full {
                mode: *mode,
                overwrite: *overwrite,
            },
            SyncCommand::Item { direction, event } => SyncSignature::Item {
                direction: *direction,
                kind: event.kind,
                key: event.key.clone(),
                version: event.version,
            },
        }
    }
}

/// Identity of a pending command. Two commands with equal signatures are the
/// same request; item signatures carry the version so a newer change to the
/// same file is never swallowed by an older pending one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncSignature {
    Full { mode: SyncMode, overwrite: bool },
    Item {
        direction: SyncDirection,
        kind: ChangeKind,
        key: String,
        version: i64,
    },
}

/// What happened to a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// An identical request was already pending
    Coalesced,
}

/// Submission side. Cheap to clone; all clones feed the one receiver.
#[derive(Clone)]
pub struct SyncQueue {
    pending: Arc<Mutex<HashSet<SyncSignature>>>,
    tx: mpsc::UnboundedSender<SyncCommand>,
}

/// Consumption side, held by the single sync worker.
pub struct SyncReceiver {
    pending: Arc<Mutex<HashSet<SyncSignature>>>,
    rx: mpsc::UnboundedReceiver<SyncCommand>,
}

impl SyncQueue {
    pub fn new() -> (SyncQueue, SyncReceiver) {
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SyncQueue {
                pending: Arc::clone(&pending),
                tx,
            },
            SyncReceiver { pending, rx },
        )
    }

    /// Queue a command unless an identical one is already waiting.
    pub fn submit(&self, command: SyncCommand) -> Result<SubmitOutcome> {
        let signature = command.signature();
        if !self.pending.lock().insert(signature.clone()) {
            debug!(?signature, "Identical sync request already pending");
            return Ok(SubmitOutcome::Coalesced);
        }

        if self.tx.send(command).is_err() {
            self.pending.lock().remove(&signature);
            return Err(SyncError::QueueClosed);
        }

        Ok(SubmitOutcome::Queued)
    }

    /// Number of commands waiting, the in-flight one excluded.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl SyncReceiver {
    /// Next command, or `None` once every sender is gone. The signature is
    /// released before the command is handed out, so a repeat request during
    /// execution queues a fresh run instead of being coalesced away.
    pub async fn recv(&mut self) -> Option<SyncCommand> {
        let command = self.rx.recv().await?;
        self.pending.lock().remove(&command.signature());
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn event(key: &str, version: i64) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Modify,
            key: key.to_string(),
            path: PathBuf::from("/tree").join(key),
            dir: String::new(),
            version,
        }
    }

    #[tokio::test]
    async fn test_full_requests_coalesce_by_signature() {
        let (queue, mut rx) = SyncQueue::new();

        let first = queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Both,
                overwrite: false,
            })
            .unwrap();
        let repeat = queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Both,
                overwrite: false,
            })
            .unwrap();

        assert_eq!(first, SubmitOutcome::Queued);
        assert_eq!(repeat, SubmitOutcome::Coalesced);
        assert_eq!(queue.pending_len(), 1);

        // A different mode is a different request
        let other = queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Pull,
                overwrite: false,
            })
            .unwrap();
        assert_eq!(other, SubmitOutcome::Queued);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_request_is_not_swallowed() {
        let (queue, _rx) = SyncQueue::new();

        queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Both,
                overwrite: false,
            })
            .unwrap();
        let forced = queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Both,
                overwrite: true,
            })
            .unwrap();

        assert_eq!(forced, SubmitOutcome::Queued);
        assert_eq!(queue.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_taking_a_command_releases_its_signature() {
        let (queue, mut rx) = SyncQueue::new();
        let command = SyncCommand::Full {
            mode: SyncMode::Push,
            overwrite: false,
        };

        queue.submit(command.clone()).unwrap();
        rx.recv().await.unwrap();

        // The worker now holds the command; a new request must queue again
        assert_eq!(queue.submit(command).unwrap(), SubmitOutcome::Queued);
    }

    #[tokio::test]
    async fn test_item_dedup_keeps_newer_versions() {
        let (queue, _rx) = SyncQueue::new();

        let duplicate = SyncCommand::Item {
            direction: SyncDirection::Push,
            event: event("User/Prefs.json", 100),
        };
        assert_eq!(
            queue.submit(duplicate.clone()).unwrap(),
            SubmitOutcome::Queued
        );
        assert_eq!(queue.submit(duplicate).unwrap(), SubmitOutcome::Coalesced);

        // Same key at a newer version still goes through
        let newer = SyncCommand::Item {
            direction: SyncDirection::Push,
            event: event("User/Prefs.json", 101),
        };
        assert_eq!(queue.submit(newer).unwrap(), SubmitOutcome::Queued);
        assert_eq!(queue.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_commands_drain_in_submission_order() {
        let (queue, mut rx) = SyncQueue::new();

        queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Pull,
                overwrite: false,
            })
            .unwrap();
        queue
            .submit(SyncCommand::Item {
                direction: SyncDirection::Push,
                event: event("a.txt", 1),
            })
            .unwrap();

        match rx.recv().await.unwrap() {
            SyncCommand::Full { mode, .. } => assert_eq!(mode, SyncMode::Pull),
            other => panic!("Expected the full request first, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SyncCommand::Item { event, .. } => assert_eq!(event.key, "a.txt"),
            other => panic!("Expected the item request second, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_after_receiver_dropped_fails() {
        let (queue, rx) = SyncQueue::new();
        drop(rx);

        let err = queue
            .submit(SyncCommand::Full {
                mode: SyncMode::Both,
                overwrite: false,
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::QueueClosed));
        assert_eq!(queue.pending_len(), 0);
    }
}
