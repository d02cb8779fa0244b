//! Sync settings shared by the engine, watchers, and scheduler

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Name of the persisted baseline file, kept at the local tree root.
pub const STATE_FILE_NAME: &str = ".mirror-state.json";

/// Suffix of the scratch file the state store writes before renaming it over
/// the real state file. A save can race a watcher tick, so the scratch name
/// must be excluded from indexing too.
pub(crate) const STATE_TMP_SUFFIX: &str = ".tmp";

/// Name of the daemon configuration file.
pub const CONFIG_FILE_NAME: &str = "mirror.toml";

/// Settings that drive a mirror pair: which trees to keep in sync, how often
/// to poll them, and which files count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Master switch. Flipped off at runtime when the sync folder turns
    /// out to be unusable, so the queue does not retry a broken setup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Absolute path of the local tree.
    pub local_folder: PathBuf,

    /// Absolute path of the remote/sync tree.
    pub sync_folder: PathBuf,

    /// Watcher poll period, e.g. "1s" or "500ms".
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Glob allowlist matched against slash-separated relative paths.
    #[serde(default = "default_files_to_include")]
    pub files_to_include: Vec<String>,

    /// Glob denylist; the engine's own state and config file names are
    /// always appended.
    #[serde(default)]
    pub files_to_ignore: Vec<String>,

    /// Directory names pruned from traversal before descent.
    #[serde(default = "default_dirs_to_ignore")]
    pub dirs_to_ignore: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            local_folder: PathBuf::new(),
            sync_folder: PathBuf::new(),
            poll_interval: default_poll_interval(),
            files_to_include: default_files_to_include(),
            files_to_ignore: Vec::new(),
            dirs_to_ignore: default_dirs_to_ignore(),
        }
    }
}

impl SyncSettings {
    /// The configured denylist plus the implicit excludes for the engine's
    /// own files, so a state save never shows up as a change.
    pub fn effective_file_ignores(&self) -> Vec<String> {
        let mut ignores = self.files_to_ignore.clone();
        ignores.push(STATE_FILE_NAME.to_string());
        ignores.push(format!("{}{}", STATE_FILE_NAME, STATE_TMP_SUFFIX));
        ignores.push(CONFIG_FILE_NAME.to_string());
        ignores
    }

    /// Where the baseline state file lives for this pair.
    pub fn state_file_path(&self) -> PathBuf {
        self.local_folder.join(STATE_FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_folder.as_os_str().is_empty() {
            return Err(SyncError::config_error("local folder is not set"));
        }
        if !self.local_folder.is_dir() {
            return Err(SyncError::config_error(format!(
                "local folder does not exist: {}",
                self.local_folder.display()
            )));
        }
        if self.sync_folder.as_os_str().is_empty() {
            return Err(SyncError::config_error("sync folder is not set"));
        }
        if !self.sync_folder.is_dir() {
            return Err(SyncError::config_error(format!(
                "sync folder does not exist: {}",
                self.sync_folder.display()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::config_error("poll interval must be non-zero"));
        }
        Ok(())
    }
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_files_to_include() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_dirs_to_ignore() -> Vec<String> {
    vec![".git".to_string()]
}
