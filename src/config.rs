//! Configuration Management
//!
//! Optional user configuration for gcp-keyprobe. Command-line flags always
//! win over the file, and the file wins over built-in defaults.

use crate::probe::http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    /// User-Agent header sent with every probe
    #[serde(default)]
    pub user_agent: Option<String>,
    /// ANSI colours in text output
    #[serde(default)]
    pub color: Option<bool>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp-keyprobe").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a file; missing or malformed files give defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get effective timeout (CLI > config > default)
    pub fn effective_timeout(&self, cli: Option<f64>) -> Duration {
        cli.or(self.timeout_secs)
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Get effective User-Agent (config > default)
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Get effective colour setting (`--no-color` > config > terminal detection)
    pub fn effective_color(&self, no_color_flag: bool, is_terminal: bool) -> bool {
        if no_color_flag {
            return false;
        }
        self.color.unwrap_or(is_terminal)
    }
}
