//! Configuration shared by the daemon and the client.
//!
//! The file lives at `$XDG_CONFIG_HOME/sw/config.json` and is also edited by
//! the CLI, so it may carry sections this crate does not care about. Those are
//! ignored; only `daemon` and `history` are read here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/sw-daemon.sock";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to get config directory")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to resolve path '{value}': {reason}")]
    Resolve { value: String, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonSettings,

    #[serde(default)]
    pub history: HistorySettings,
}

/// Daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonSettings {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

/// Wallpaper history settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistorySettings {
    #[serde(default = "default_history_file")]
    pub file: String,

    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            file: default_history_file(),
            limit: default_history_limit(),
        }
    }
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}
fn default_history_file() -> String {
    "~/.cache/sw-history".to_string()
}
fn default_history_limit() -> usize {
    500
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("sw");

        Ok(config_dir.join("config.json"))
    }

    /// Absolute path of the daemon control socket
    pub fn socket_path(&self) -> Result<PathBuf, ConfigError> {
        resolve_path(&self.daemon.socket_path)
    }

    /// Absolute path of the history file
    pub fn history_file(&self) -> Result<PathBuf, ConfigError> {
        resolve_path(&self.history.file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.socket_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Missing required config key: 'daemon.socket_path'".to_string(),
            ));
        }

        if self.history.file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Missing required config key: 'history.file'".to_string(),
            ));
        }

        if self.history.limit == 0 {
            return Err(ConfigError::Invalid(
                "'history.limit' must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand `~` and environment variables, then make the path absolute.
pub fn resolve_path(value: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(value).map_err(|e| ConfigError::Resolve {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    std::path::absolute(expanded.as_ref()).map_err(|e| ConfigError::Resolve {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
