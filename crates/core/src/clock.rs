// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock sources.
//!
//! Everything that expires (cache entries, rate-limit windows, idempotency
//! retention, claim timeouts) reads time through [`ClockSource`], so tests
//! can drive expiry with a [`ManualClock`] instead of sleeping.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Trait for getting the current wall clock time.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;

    /// Returns the current time as a UTC timestamp.
    fn now(&self) -> DateTime<Utc> {
        ms_to_datetime(self.now_ms())
    }
}

/// A clock shared between services.
pub type SharedClock = Arc<dyn ClockSource>;

/// System clock implementation using `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Returns the system clock as a [`SharedClock`].
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl<C: ClockSource> ClockSource for &C {
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep one handle and
/// give another to the service under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `initial_ms`.
    pub fn new(initial_ms: u64) -> Self {
        ManualClock {
            time_ms: Arc::new(AtomicU64::new(initial_ms)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, ms: u64) {
        self.time_ms.store(ms, Ordering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.time_ms
            .fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    /// Returns this clock as a [`SharedClock`] sharing the same time.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Converts milliseconds since Unix epoch to a UTC timestamp.
///
/// Out-of-range values collapse to the epoch.
pub fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
