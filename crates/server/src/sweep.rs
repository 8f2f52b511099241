// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic background cleanup.
//!
//! Two tasks run for the life of the server: the idempotency retention
//! sweep (hourly by default) and the rate limit counter sweep (every five
//! minutes by default). Both stop when the cancellation token fires.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::ServerState;

/// Starts both sweeps.
pub fn spawn(state: &ServerState, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    let retention_every = state.config().idempotency.sweep_interval();
    let rate_every = state.config().rate_limit_sweep_interval();

    let retention_state = state.clone();
    let rate_state = state.clone();
    vec![
        spawn_periodic(retention_every, cancel.clone(), move || {
            retention_sweep(&retention_state);
        }),
        spawn_periodic(rate_every, cancel, move || {
            rate_limit_sweep(&rate_state);
        }),
    ]
}

fn spawn_periodic(
    every: Duration,
    cancel: CancellationToken,
    mut tick: impl FnMut() + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so sweeps start one period in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => tick(),
            }
        }
    })
}

/// Deletes idempotency records past retention.
pub fn retention_sweep(state: &ServerState) -> usize {
    match state.coordinator().purge_expired() {
        Ok(0) => {
            debug!("Retention sweep: nothing to purge");
            0
        }
        Ok(purged) => {
            info!("Retention sweep purged {} idempotency records", purged);
            purged
        }
        Err(e) => {
            warn!("Retention sweep failed: {}", e);
            0
        }
    }
}

/// Drops rate limit counters whose window has passed.
pub fn rate_limit_sweep(state: &ServerState) -> usize {
    let removed = state.limiter().sweep();
    debug!(
        "Rate limit sweep removed {} counters, {} remain",
        removed,
        state.limiter().len()
    );
    removed
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
