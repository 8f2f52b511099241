// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync manager: drains the offline queue through per-resource handlers.
//!
//! Each operation moves through:
//!
//! ```text
//! pending ──replay──┬── ok ──────────────────────> removed
//!                   └── err ── retry_count + 1 ──┬── < max ──> pending
//!                                                └── ≥ max ──> dropped
//! ```
//!
//! A run visits every operation that was pending when it started, once, in
//! enqueue order. Only one run is active at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rp_core::{OpKind, OpUpdate, SharedClock, SyncOperation, SystemClock};

use super::handler::{HandlerError, SyncHandler};
use super::listener::{ListenerId, ListenerRegistry, SyncEvent, SyncStatus};
use super::queue::OfflineQueue;
use crate::config::ClientConfig;
use crate::error::Result;

/// Counts from one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Operations pending when the run started.
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed and left pending for a later run.
    pub retried: usize,
    /// Failed for the last allowed time and removed.
    pub dropped: usize,
    /// Operations left in the queue afterwards.
    pub remaining: usize,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.retried + self.dropped
    }
}

/// Result of asking for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRun {
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
    Completed(SyncReport),
}

/// Result of [`SyncManager::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The server accepted the operation right away.
    Sent(Value),
    /// The operation was queued under this id.
    Queued(String),
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type Handlers = HashMap<String, Arc<dyn SyncHandler>>;

enum Attempt {
    Succeeded,
    Retried,
    Dropped,
}

pub struct SyncManager {
    queue: Arc<OfflineQueue>,
    handlers: RwLock<Handlers>,
    listeners: ListenerRegistry,
    clock: SharedClock,
    in_flight: AtomicBool,
    online: AtomicBool,
    status: Mutex<SyncStatus>,
    max_retries: u32,
    interval: Duration,
}

impl SyncManager {
    pub fn new(queue: Arc<OfflineQueue>, config: &ClientConfig) -> Self {
        Self::with_clock(queue, config, SystemClock::shared())
    }

    pub fn with_clock(
        queue: Arc<OfflineQueue>,
        config: &ClientConfig,
        clock: SharedClock,
    ) -> Self {
        SyncManager {
            queue,
            handlers: RwLock::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
            clock,
            in_flight: AtomicBool::new(false),
            online: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::Idle),
            max_retries: config.max_retries,
            interval: config.sync_interval(),
        }
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Time between periodic syncs in [`SyncManager::run`].
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Associates `resource` with the handler replaying its operations,
    /// replacing any previous one.
    pub fn register_handler(
        &self,
        resource: impl Into<String>,
        handler: impl SyncHandler + 'static,
    ) {
        let resource = resource.into();
        debug!(resource, "registering sync handler");
        self.write_handlers().insert(resource, Arc::new(handler));
    }

    pub fn unregister_handler(&self, resource: &str) -> bool {
        self.write_handlers().remove(resource).is_some()
    }

    pub fn has_handler(&self, resource: &str) -> bool {
        self.handler(resource).is_some()
    }

    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<SyncEvent>) {
        self.listeners.subscribe()
    }

    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(SyncEvent) + Send + 'static,
    {
        self.listeners.add_callback(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Status of the last broadcast.
    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Queues a new operation and returns its id.
    pub fn enqueue(&self, kind: OpKind, resource: &str, payload: Value) -> Result<String> {
        let op = SyncOperation::new(kind, resource, payload, self.clock.now())?;
        let id = self.queue.enqueue(&op)?;
        debug!(%id, resource, %kind, "queued operation");
        Ok(id)
    }

    /// Sends an operation now when online, queueing it otherwise.
    ///
    /// A failed direct attempt is queued under the same id, so a replay of an
    /// attempt that did reach the server is answered from its record.
    pub async fn submit(
        &self,
        kind: OpKind,
        resource: &str,
        payload: Value,
    ) -> Result<SubmitOutcome> {
        let op = SyncOperation::new(kind, resource, payload, self.clock.now())?;
        if self.is_online() {
            if let Some(handler) = self.handler(resource) {
                let key = op.idempotency_key()?;
                match handler.replay(op.clone(), key).await {
                    Ok(body) => return Ok(SubmitOutcome::Sent(body)),
                    Err(e) => warn!(id = %op.id, error = %e, "direct submit failed, queueing"),
                }
            }
        }
        let id = self.queue.enqueue(&op)?;
        Ok(SubmitOutcome::Queued(id))
    }

    /// Replays every pending operation once.
    ///
    /// Returns [`SyncRun::AlreadyRunning`] without touching the queue while
    /// another run is active. A queue failure aborts the run, is broadcast
    /// as [`SyncStatus::Error`] and returned.
    pub async fn sync(&self) -> Result<SyncRun> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("sync already in progress");
            return Ok(SyncRun::AlreadyRunning);
        };

        self.publish(SyncStatus::Syncing, 0);
        match self.drain().await {
            Ok(report) => {
                let status = if report.failed() > 0 {
                    SyncStatus::Error
                } else {
                    SyncStatus::Success
                };
                self.publish(status, 100);
                Ok(SyncRun::Completed(report))
            }
            Err(e) => {
                error!(error = %e, "sync run failed");
                self.publish(SyncStatus::Error, 100);
                Err(e)
            }
        }
    }

    async fn drain(&self) -> Result<SyncReport> {
        let pending = self.queue.list_pending()?;
        let total = pending.len();
        let mut report = SyncReport {
            attempted: total,
            ..SyncReport::default()
        };
        info!(pending = total, "sync started");

        for (done, op) in pending.into_iter().enumerate() {
            match self.attempt(op).await? {
                Attempt::Succeeded => report.succeeded += 1,
                Attempt::Retried => report.retried += 1,
                Attempt::Dropped => report.dropped += 1,
            }
            self.publish(SyncStatus::Syncing, percent(done + 1, total));
        }

        report.remaining = self.queue.count()?;
        info!(
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            remaining = report.remaining,
            "sync finished"
        );
        Ok(report)
    }

    async fn attempt(&self, op: SyncOperation) -> Result<Attempt> {
        let id = op.id.clone();
        let resource = op.resource.clone();
        let retry_count = op.retry_count + 1;

        match self.replay(op).await {
            Ok(_) => {
                self.queue.remove(&id)?;
                debug!(%id, "replayed");
                Ok(Attempt::Succeeded)
            }
            Err(e) if retry_count >= self.max_retries => {
                self.queue.remove(&id)?;
                warn!(%id, resource, attempts = retry_count, error = %e, "dropping operation");
                self.listeners.broadcast(SyncEvent::Dropped {
                    id,
                    resource,
                    error: e.to_string(),
                });
                Ok(Attempt::Dropped)
            }
            Err(e) => {
                debug!(%id, attempts = retry_count, error = %e, "replay failed");
                self.queue
                    .update(&id, &OpUpdate::failure(retry_count, e.to_string()))?;
                Ok(Attempt::Retried)
            }
        }
    }

    async fn replay(&self, op: SyncOperation) -> std::result::Result<Value, HandlerError> {
        let handler = self.handler(&op.resource).ok_or_else(|| {
            HandlerError::Other(format!("no handler registered for resource '{}'", op.resource))
        })?;
        let key = op
            .idempotency_key()
            .map_err(|e| HandlerError::Other(e.to_string()))?;
        handler.replay(op, key).await
    }

    /// Syncs every interval while online and right away when coming back
    /// online. Returns when `cancel` fires or the connectivity sender is
    /// dropped.
    pub async fn run(
        self: Arc<Self>,
        mut online: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut was_online = *online.borrow_and_update();
        self.set_online(was_online);
        if was_online {
            self.sync_logged().await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_online() {
                        self.sync_logged().await;
                    }
                }
                changed = online.changed() => {
                    if changed.is_err() {
                        debug!("connectivity source closed");
                        break;
                    }
                    let now_online = *online.borrow_and_update();
                    self.set_online(now_online);
                    if now_online && !was_online {
                        info!("back online, syncing");
                        self.sync_logged().await;
                    } else if !now_online && was_online {
                        info!("offline");
                    }
                    was_online = now_online;
                }
            }
        }
    }

    async fn sync_logged(&self) {
        match self.sync().await {
            Ok(SyncRun::Completed(report)) if report.attempted > 0 => {
                debug!(?report, "periodic sync completed");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "periodic sync failed"),
        }
    }

    fn publish(&self, status: SyncStatus, progress: u8) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        self.listeners.broadcast(SyncEvent::status(status, progress));
    }

    fn handler(&self, resource: &str) -> Option<Arc<dyn SyncHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
            .cloned()
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
