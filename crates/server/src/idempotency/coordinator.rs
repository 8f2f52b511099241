// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Claim-then-execute coordination over an [`IdempotencyStore`].

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use rp_core::clock::duration_ms;
use rp_core::{IdempotencyKey, SharedClock};

use super::store::{
    ClaimToken, IdempotencyRecord, IdempotencyStore, InsertOutcome, RecordState, Scope,
    StoreError, StoreResult, StoredResponse,
};
use crate::error::Result;

/// Timing knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How long a pending claim may sit before another attempt takes it over.
    pub claim_timeout: Duration,
    /// How often a waiting attempt re-reads a pending claim.
    pub poll_interval: Duration,
    /// How long completed records are kept.
    pub retention: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            claim_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(25),
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of an idempotent execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation ran on this call.
    Fresh(StoredResponse),
    /// A previous call's response was returned instead of running again.
    Replayed {
        response: StoredResponse,
        original_at: DateTime<Utc>,
    },
}

impl Outcome {
    fn replayed(record: IdempotencyRecord) -> Self {
        Outcome::Replayed {
            response: record.response,
            original_at: record.created_at,
        }
    }

    pub fn response(&self) -> &StoredResponse {
        match self {
            Outcome::Fresh(response) | Outcome::Replayed { response, .. } => response,
        }
    }

    pub fn into_response(self) -> StoredResponse {
        match self {
            Outcome::Fresh(response) | Outcome::Replayed { response, .. } => response,
        }
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, Outcome::Replayed { .. })
    }

    pub fn original_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Outcome::Fresh(_) => None,
            Outcome::Replayed { original_at, .. } => Some(*original_at),
        }
    }
}

/// Runs each `(key, user, endpoint)` operation at most once.
pub struct IdempotencyCoordinator<S> {
    store: Arc<S>,
    clock: SharedClock,
    config: CoordinatorConfig,
}

impl<S> Clone for IdempotencyCoordinator<S> {
    fn clone(&self) -> Self {
        IdempotencyCoordinator {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config,
        }
    }
}

impl<S: IdempotencyStore + 'static> IdempotencyCoordinator<S> {
    pub fn new(store: Arc<S>, clock: SharedClock, config: CoordinatorConfig) -> Self {
        IdempotencyCoordinator {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Executes `operation` unless an equivalent call already has.
    ///
    /// A recorded response for the same key, user and endpoint is replayed.
    /// A concurrent attempt holding the claim is waited on. Otherwise the
    /// operation runs and its response is recorded. A failed operation
    /// records nothing, so the caller may retry with the same key.
    ///
    /// Store failures never block the operation: if no claim can be
    /// recorded the operation runs anyway and a warning is logged. Store
    /// calls run on tokio's blocking pool.
    pub async fn execute<F, Fut>(
        &self,
        key: &IdempotencyKey,
        user_id: &str,
        endpoint: &str,
        operation: F,
    ) -> Result<Outcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StoredResponse>>,
    {
        let scope = Scope::new(key.clone(), user_id, endpoint);

        let claim = match self.acquire(&scope).await {
            Acquired::Replay(record) => {
                debug!(key = %key, endpoint, "replaying recorded response");
                return Ok(Outcome::replayed(record));
            }
            Acquired::Claim(token) => Some(token),
            Acquired::Unrecorded => None,
        };

        let result = operation().await;

        let Some(token) = claim else {
            return result.map(Outcome::Fresh);
        };

        match result {
            Ok(response) => Ok(self.record(&scope, token, response).await),
            Err(e) => {
                let released = self
                    .on_store(&scope, move |store, scope| store.release(scope, &token))
                    .await;
                if let Err(release_err) = released {
                    warn!(key = %key, endpoint, error = %release_err, "failed to release idempotency claim");
                }
                Err(e)
            }
        }
    }

    /// Deletes records older than the retention period.
    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(duration_ms(self.config.retention));
        Ok(self.store.purge_older_than(cutoff)?)
    }

    async fn acquire(&self, scope: &Scope) -> Acquired {
        let timeout_ms = duration_ms(self.config.claim_timeout);
        loop {
            match self.on_store(scope, |store, scope| store.find(scope)).await {
                Ok(Some(RecordState::Complete(record))) => return Acquired::Replay(record),
                Ok(Some(RecordState::Pending { claimed_at_ms })) => {
                    let now = self.clock.now_ms();
                    if now.saturating_sub(claimed_at_ms) >= timeout_ms {
                        let stale_before = now.saturating_sub(timeout_ms);
                        let taken = self
                            .on_store(scope, move |store, scope| {
                                store.take_over(scope, stale_before, now)
                            })
                            .await;
                        match taken {
                            Ok(Some(token)) => {
                                warn!(key = %scope.key, endpoint = %scope.endpoint, "took over abandoned idempotency claim");
                                return Acquired::Claim(token);
                            }
                            Ok(None) => continue,
                            Err(e) => {
                                warn!(key = %scope.key, error = %e, "idempotency takeover failed, executing unrecorded");
                                return Acquired::Unrecorded;
                            }
                        }
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(None) => {
                    let now = self.clock.now_ms();
                    let inserted = self
                        .on_store(scope, move |store, scope| store.insert_claim(scope, now))
                        .await;
                    match inserted {
                        Ok(InsertOutcome::Inserted(token)) => return Acquired::Claim(token),
                        // Lost the race; the next find sees the winner.
                        Ok(InsertOutcome::Conflict) => continue,
                        Err(e) => {
                            warn!(key = %scope.key, error = %e, "could not record idempotency claim, executing unrecorded");
                            return Acquired::Unrecorded;
                        }
                    }
                }
                Err(e) => {
                    warn!(key = %scope.key, error = %e, "idempotency lookup failed, executing unrecorded");
                    return Acquired::Unrecorded;
                }
            }
        }
    }

    async fn record(&self, scope: &Scope, token: ClaimToken, response: StoredResponse) -> Outcome {
        let now = self.clock.now_ms();
        let stored = response.clone();
        let completed = self
            .on_store(scope, move |store, scope| store.complete(scope, &token, &stored, now))
            .await;
        match completed {
            Ok(()) => Outcome::Fresh(response),
            // Claim was taken over while we ran; the first recorded response wins.
            Err(StoreError::ClaimLost) => {
                match self.on_store(scope, |store, scope| store.find(scope)).await {
                    Ok(Some(RecordState::Complete(record))) => Outcome::replayed(record),
                    _ => {
                        warn!(key = %scope.key, "idempotency claim lost before completion");
                        Outcome::Fresh(response)
                    }
                }
            }
            Err(e) => {
                warn!(key = %scope.key, error = %e, "failed to record idempotent response");
                Outcome::Fresh(response)
            }
        }
    }

    /// Runs one store call for `scope` on the blocking pool.
    async fn on_store<T, F>(&self, scope: &Scope, call: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&S, &Scope) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || call(&store, &scope))
            .await
            .unwrap_or_else(|e| Err(StoreError::Task(e.to_string())))
    }
}

enum Acquired {
    Replay(IdempotencyRecord),
    Claim(ClaimToken),
    Unrecorded,
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
