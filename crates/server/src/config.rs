// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration.
//!
//! Read from `rampartd.toml`. Every field has a default, so an empty file
//! (or no file at all) yields a working server.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::idempotency::CoordinatorConfig;
use crate::ratelimit::RateLimits;

const APP_DIR_NAME: &str = "rampart";
const CONFIG_FILE_NAME: &str = "rampartd.toml";
const IDEMPOTENCY_DB_NAME: &str = "idempotency.db";
const RECORDS_DB_NAME: &str = "records.db";

/// Configuration for `rampartd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Directory holding the SQLite files. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Interval between sweeps of expired rate limit counters.
    #[serde(default = "default_rate_limit_sweep_secs")]
    pub rate_limit_sweep_secs: u64,
    /// Record resources served by the built-in actions.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
    /// How long the cached `stats` aggregate stays fresh.
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub rate_limits: RateLimits,
}

/// Idempotency record retention and claim timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// A pending claim older than this is considered abandoned.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7890))
}

fn default_rate_limit_sweep_secs() -> u64 {
    5 * 60
}

fn default_resources() -> Vec<String> {
    vec!["records".to_string()]
}

fn default_stats_ttl_secs() -> u64 {
    60
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_claim_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    25
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        IdempotencyConfig {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            claim_timeout_secs: default_claim_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl IdempotencyConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            claim_timeout: Duration::from_secs(self.claim_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retention: Duration::from_secs(self.retention_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            data_dir: None,
            idempotency: IdempotencyConfig::default(),
            rate_limits: RateLimits::default(),
            rate_limit_sweep_secs: default_rate_limit_sweep_secs(),
            resources: default_resources(),
            stats_ttl_secs: default_stats_ttl_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads and validates configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, else the default file if it exists, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.rate_limits.validate()?;

        let idem = &self.idempotency;
        if idem.retention_secs == 0 {
            return Err(Error::Config(
                "idempotency.retention_secs must be at least 1".to_string(),
            ));
        }
        if idem.sweep_interval_secs == 0 || self.rate_limit_sweep_secs == 0 {
            return Err(Error::Config("sweep intervals must be at least 1 second".to_string()));
        }
        if idem.claim_timeout_secs == 0 || idem.poll_interval_ms == 0 {
            return Err(Error::Config(
                "idempotency claim timeout and poll interval must be non-zero".to_string(),
            ));
        }
        for resource in &self.resources {
            if resource.is_empty()
                || !resource
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(Error::Config(format!(
                    "invalid resource name '{resource}'\n  hint: use letters, digits, '_' or '-'"
                )));
            }
        }
        Ok(())
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir(),
        }
    }

    pub fn idempotency_db_path(&self) -> PathBuf {
        self.data_dir().join(IDEMPOTENCY_DB_NAME)
    }

    pub fn records_db_path(&self) -> PathBuf {
        self.data_dir().join(RECORDS_DB_NAME)
    }
}

/// `$XDG_CONFIG_HOME/rampart/rampartd.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// `$XDG_DATA_HOME/rampart` or the platform equivalent, falling back to `./.rampart`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".rampart"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
