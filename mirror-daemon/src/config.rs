use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mirror::{SyncSettings, CONFIG_FILE_NAME};

/// Top-level daemon configuration: the sync pair plus daemon-only knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub sync: SyncSettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional log file. When unset the daemon logs to the console only.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            sync: SyncSettings {
                local_folder: PathBuf::from("./local"),
                sync_folder: PathBuf::from("./sync"),
                ..SyncSettings::default()
            },
            daemon: DaemonSettings::default(),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl MirrorConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: MirrorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        match self.daemon.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Unknown log level: {}", other),
        }

        Ok(())
    }
}

/// Commented starter configuration written by `config init`.
pub const CONFIG_TEMPLATE: &str = r#"# Mirror sync configuration.

[sync]
# Both folders must exist before the daemon will start.
local_folder = "./local"
sync_folder = "./sync"
# How often the watchers poll for changes.
poll_interval = "1s"
# Globs match slash-separated paths relative to the tree root.
files_to_include = ["*"]
files_to_ignore = []
# Directory names skipped during traversal.
dirs_to_ignore = [".git"]

[daemon]
log_level = "info"
# Uncomment to also log to a file.
# log_file = "mirror-daemon.log"
"#;

/// Where the daemon looks for its configuration when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("mirror").join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_minimal_config_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            "[sync]\nlocal_folder = \"/tmp/a\"\nsync_folder = \"/tmp/b\"\n",
        )
        .await
        .unwrap();

        let config = MirrorConfig::load(&path).await.unwrap();

        assert_eq!(config.sync.local_folder, PathBuf::from("/tmp/a"));
        assert_eq!(config.sync.poll_interval, Duration::from_secs(1));
        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_file.is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = MirrorConfig::default();
        config.sync.files_to_ignore = vec!["*.tmp".to_string()];
        config.daemon.log_level = "debug".to_string();
        config.save(&path).await.unwrap();

        let loaded = MirrorConfig::load(&path).await.unwrap();

        assert_eq!(loaded.sync.files_to_ignore, vec!["*.tmp".to_string()]);
        assert_eq!(loaded.daemon.log_level, "debug");
    }

    #[test]
    fn test_template_parses_as_valid_toml() {
        let config: MirrorConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();

        assert_eq!(config.sync.local_folder, PathBuf::from("./local"));
        assert_eq!(config.sync.sync_folder, PathBuf::from("./sync"));
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let local = tempfile::TempDir::new().unwrap();
        let remote = tempfile::TempDir::new().unwrap();

        let mut config = MirrorConfig::default();
        config.sync.local_folder = local.path().to_path_buf();
        config.sync.sync_folder = remote.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
