//! Failure modes of the mirror engine.

use std::path::{Path, PathBuf};

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything that can fail while keeping two folders mirrored.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Settings the engine refuses to run with, or a disabled service.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A tree walk failed before producing a complete listing.
    #[error("Could not scan '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// An include or ignore glob did not compile.
    #[error("Invalid filter pattern: {0}")]
    FilterPattern(String),

    /// Copying a file to the opposite tree failed.
    #[error("Copy failed: {message}")]
    FileCopy { message: String },

    /// Removing a mirrored file failed.
    #[error("Could not delete '{path}': {message}")]
    FileDeletion { path: PathBuf, message: String },

    /// The baseline file could not be written or swapped into place.
    #[error("State file error at '{path}': {message}")]
    StatePersistence { path: PathBuf, message: String },

    /// The baseline JSON failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A request arrived after the queue worker shut down.
    #[error("Sync queue is closed")]
    QueueClosed,
}

impl SyncError {
    /// Configuration failure with the given message.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Scan failure at `path`.
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Copy failure annotated with both endpoints of the transfer.
    pub fn copy_error(
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        message: impl Into<String>,
    ) -> Self {
        Self::FileCopy {
            message: format!(
                "'{}' -> '{}': {}",
                source.as_ref().display(),
                dest.as_ref().display(),
                message.into()
            ),
        }
    }

    /// Deletion failure at `path`.
    pub fn deletion_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileDeletion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Persistence failure for the baseline at `path`.
    pub fn state_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StatePersistence {
            path: path.into(),
            message: message.into(),
        }
    }
}
