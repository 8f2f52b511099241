// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Stored in `rampart.toml`:
//! - `server_url`: WebSocket URL of the rampartd server
//! - `queue_path`: SQLite file holding the offline queue
//! - `user_id`: subject sent with every request
//! - sync timing, retry bound and reconnect backoff

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const APP_DIR_NAME: &str = "rampart";
const CONFIG_FILE_NAME: &str = "rampart.toml";
const QUEUE_FILE_NAME: &str = "queue.db";

/// Client configuration stored in `rampart.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server URL (`ws://` or `wss://`).
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Offline queue location. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_path: Option<PathBuf>,
    /// Subject sent with requests. Without one the server scopes by address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Resources the sync command replays, in addition to any found queued.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
    /// Seconds between periodic syncs while online (default: 30).
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Failed replays before an operation is dropped (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds to wait for a server answer (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Reconnect backoff: the delay doubles after each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt in milliseconds (default: 100).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on the delay in seconds (default: 30).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Connection attempts before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_server_url() -> String {
    "ws://localhost:7890".to_string()
}

fn default_resources() -> Vec<String> {
    vec!["records".to_string()]
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap_ms = self.max_delay_secs.saturating_mul(1000);
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor).min(cap_ms))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: default_server_url(),
            queue_path: None,
            user_id: None,
            resources: default_resources(),
            sync_interval_secs: default_sync_interval_secs(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, else the default file if present, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Saves configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "invalid server_url '{}': must start with ws:// or wss://",
                self.server_url
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        if self.sync_interval_secs == 0 || self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "sync_interval_secs and request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.backoff.max_attempts == 0 {
            return Err(Error::Config(
                "backoff.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved offline queue path.
    pub fn queue_path(&self) -> PathBuf {
        match &self.queue_path {
            Some(path) => path.clone(),
            None => default_data_dir().join(QUEUE_FILE_NAME),
        }
    }

    /// Lock file guarding the queue against concurrent sync processes.
    pub fn lock_path(&self) -> PathBuf {
        self.queue_path().with_extension("lock")
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `$XDG_CONFIG_HOME/rampart/rampart.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".rampart"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
