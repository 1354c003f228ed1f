//! Configuration management for the backup tool.
//!
//! Credentials come from a JSON file; optional tuning comes from a TOML
//! settings file. Both are loaded once at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Login details for the NAS. Consumed by the login call and dropped afterwards.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Base URL of the NAS, e.g. `https://me.myqnapcloud.com`
    pub url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a JSON file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!(
                "{} file not found. Create one or specify an alternate location with -c.",
                path.display()
            );
        }
        let content = std::fs::read_to_string(path)?;
        let creds: Credentials = serde_json::from_str(&content)?;
        Ok(creds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Minimum wall-clock seconds between progress notifications
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_interval_secs() -> u64 {
    5
}

fn default_user_agent() -> String {
    format!("nas-backup/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log: LogConfig::default(),
            upload: UploadConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}
