// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-window rate limiting over the in-process TTL cache.
//!
//! Each `(class, identity)` pair owns one counter. The first request opens a
//! window of `window` length; requests inside the window increment the
//! counter and are denied once it passes `max_requests`. A request at or
//! after the reset time replaces the entry and opens a new window.
//!
//! Known limitation: windows are fixed, not sliding, so a client bursting at
//! the end of one window and the start of the next can get up to
//! `2 * max_requests` through in a short span.
//!
//! Counters live in process memory. Each server instance limits
//! independently; a fleet of N instances admits up to N times the
//! configured rate per identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use rp_core::clock::duration_ms;
use rp_core::protocol::RateLimitInfo;
use rp_core::{SharedClock, TtlCache};

use crate::error::{Error, Result};

/// Limit for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        RateLimitConfig {
            max_requests,
            window_secs: window.as_secs(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self, class: LimitClass) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::InvalidRateLimit {
                class: class.to_string(),
                reason: "max_requests must be at least 1".to_string(),
            });
        }
        if self.window_secs == 0 {
            return Err(Error::InvalidRateLimit {
                class: class.to_string(),
                reason: "window_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Endpoint classes, each counted separately so one cannot starve another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitClass {
    /// Login and credential endpoints.
    Auth,
    /// Mutating endpoints.
    Write,
    /// Reads.
    Read,
}

impl LimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitClass::Auth => "auth",
            LimitClass::Write => "write",
            LimitClass::Read => "read",
        }
    }
}

impl fmt::Display for LimitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auth" => Ok(LimitClass::Auth),
            "write" => Ok(LimitClass::Write),
            "read" => Ok(LimitClass::Read),
            _ => Err(Error::Config(format!(
                "unknown rate limit class '{s}' (expected auth, write or read)"
            ))),
        }
    }
}

/// Per-class limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_auth")]
    pub auth: RateLimitConfig,
    #[serde(default = "default_write")]
    pub write: RateLimitConfig,
    #[serde(default = "default_read")]
    pub read: RateLimitConfig,
}

fn default_auth() -> RateLimitConfig {
    RateLimitConfig::new(5, Duration::from_secs(60))
}

fn default_write() -> RateLimitConfig {
    RateLimitConfig::new(30, Duration::from_secs(60))
}

fn default_read() -> RateLimitConfig {
    RateLimitConfig::new(120, Duration::from_secs(60))
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            auth: default_auth(),
            write: default_write(),
            read: default_read(),
        }
    }
}

impl RateLimits {
    pub fn for_class(&self, class: LimitClass) -> &RateLimitConfig {
        match class {
            LimitClass::Auth => &self.auth,
            LimitClass::Write => &self.write,
            LimitClass::Read => &self.read,
        }
    }

    /// Rejects zero limits or zero-length windows.
    pub fn validate(&self) -> Result<()> {
        for class in [LimitClass::Auth, LimitClass::Write, LimitClass::Read] {
            self.for_class(class).validate(class)?;
        }
        Ok(())
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at_ms: u64,
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Seconds until the window resets; only set when denied.
    pub retry_after_secs: Option<u64>,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
}

impl Decision {
    /// Informational state for response headers.
    pub fn info(&self) -> RateLimitInfo {
        RateLimitInfo {
            limit: self.limit,
            remaining: self.remaining,
            reset: self.reset_at_ms.div_ceil(1000),
        }
    }
}

/// Fixed-window rate limiter.
///
/// Construct one per process and share it by handle; `check` never fails.
pub struct RateLimiter {
    entries: TtlCache<RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(clock: SharedClock) -> Self {
        RateLimiter {
            entries: TtlCache::new(clock),
        }
    }

    /// Counts one request for `identity` against `config`.
    pub fn check(&self, identity: &str, config: &RateLimitConfig) -> Decision {
        let window = config.window();
        let limit = config.max_requests;

        let decision = self.entries.update(identity, |live, now| match live {
            Some(entry) if now < entry.window_reset_at_ms => {
                entry.count = entry.count.saturating_add(1);
                (decide(entry, limit, now), None)
            }
            _ => {
                let entry = RateLimitEntry {
                    count: 1,
                    window_reset_at_ms: now.saturating_add(duration_ms(window)),
                };
                (decide(&entry, limit, now), Some((entry, window)))
            }
        });

        if !decision.allowed {
            debug!(
                identity,
                retry_after = decision.retry_after_secs,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Counts one request for `identity` in `class`, keyed `class:identity`.
    pub fn check_class(&self, identity: &str, class: LimitClass, limits: &RateLimits) -> Decision {
        let key = format!("{}:{}", class, identity);
        self.check(&key, limits.for_class(class))
    }

    /// Drops counters whose window has passed.
    pub fn sweep(&self) -> usize {
        self.entries.sweep()
    }

    /// Number of tracked counters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decide(entry: &RateLimitEntry, limit: u32, now: u64) -> Decision {
    let allowed = entry.count <= limit;
    let retry_after_secs = if allowed {
        None
    } else {
        Some(entry.window_reset_at_ms.saturating_sub(now).div_ceil(1000))
    };
    Decision {
        allowed,
        retry_after_secs,
        limit,
        remaining: limit.saturating_sub(entry.count),
        reset_at_ms: entry.window_reset_at_ms,
    }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
