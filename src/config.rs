//! Configuration loading and management
//!
//! Handles parsing of `.pilot/tasks.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::storage::{CONFIG_FILE, PILOT_DIR};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Board manager configuration
    #[serde(default)]
    pub board: BoardConfig,
}

/// Board manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Prefix for generated task ids
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    /// Watch each loaded board's log for external edits
    #[serde(default = "default_watch")]
    pub watch: bool,

    /// Quiet period before a burst of file changes triggers one reload
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long to wait for the cross-process log lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_id_prefix() -> String {
    "task".to_string()
}

fn default_watch() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_lock_timeout_ms() -> u64 {
    crate::lock::DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project root, or return defaults
    pub fn load_from_project(project_root: &Path) -> Self {
        let config_path = project_root.join(PILOT_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %err,
                    "ignoring invalid task board config"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.board.validate()
    }
}

impl BoardConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let prefix = self.id_prefix.trim();
        if prefix.is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "board.id_prefix cannot be empty".to_string(),
            ));
        }
        if !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(crate::error::Error::InvalidConfig(
                "board.id_prefix must be alphanumeric".to_string(),
            ));
        }
        if self.debounce_ms == 0 || self.debounce_ms > 60_000 {
            return Err(crate::error::Error::InvalidConfig(
                "board.debounce_ms must be between 1 and 60000".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "board.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}
