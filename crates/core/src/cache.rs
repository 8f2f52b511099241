// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process key-value cache with per-entry TTL.
//!
//! Backs the rate limiter's window counters and read-through caches for
//! expensive aggregates. State is local to one process and may be dropped at
//! any time without affecting correctness.
//!
//! An entry stored at `t` with TTL `d` is live while `now < t + d`; a read at
//! or after `t + d` is a miss and evicts the entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{duration_ms, SharedClock};

/// A cached value with the time it was stored and how long it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at_ms: u64,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// Milliseconds since Unix epoch at which the entry stops being live.
    pub fn expires_at_ms(&self) -> u64 {
        self.stored_at_ms.saturating_add(duration_ms(self.ttl))
    }

    /// Returns true if the entry is no longer live at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }
}

/// Thread-safe TTL cache keyed by string.
pub struct TtlCache<V> {
    clock: SharedClock,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Creates an empty cache reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        TtlCache {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the live value for `key`, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at_ms: self.clock.now_ms(),
            ttl,
        };
        self.lock().insert(key.into(), entry);
    }

    /// Removes `key`, returning its value if it was still live.
    pub fn remove(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        self.lock()
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    /// Atomically reads and modifies the entry for `key`.
    ///
    /// `f` runs under the cache lock and receives the live value (or `None`
    /// if the key is absent or expired) plus the current time. It may mutate
    /// the live value in place, keeping its original expiry, or return a
    /// replacement `(value, ttl)` which is stored as a fresh entry.
    pub fn update<R>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut V>, u64) -> (R, Option<(V, Duration)>),
    ) -> R {
        let now = self.clock.now_ms();
        let mut entries = self.lock();

        let live = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => Some(&mut entry.value),
            _ => None,
        };

        let (result, replacement) = f(live, now);
        if let Some((value, ttl)) = replacement {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    stored_at_ms: now,
                    ttl,
                },
            );
        }
        result
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// `compute` runs outside the lock, so concurrent misses may compute the
    /// value more than once; the last one stored wins.
    pub fn get_or_insert_with(&self, key: &str, ttl: Duration, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone(), ttl);
        value
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with).
    ///
    /// Errors are returned to the caller and nothing is cached.
    pub fn try_get_or_insert_with<E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
