// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync status listeners.
//!
//! Each listener owns an unbounded channel, so broadcasting never waits on a
//! slow consumer. Listeners whose receiver was dropped are pruned on the next
//! broadcast.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;

/// Overall state of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Something a listener is told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Progress of the current run, in percent of the pending operations.
    Status { status: SyncStatus, progress: u8 },
    /// An operation hit the retry limit and was removed from the queue.
    Dropped {
        id: String,
        resource: String,
        error: String,
    },
}

impl SyncEvent {
    pub fn status(status: SyncStatus, progress: u8) -> Self {
        SyncEvent::Status { status, progress }
    }
}

type Senders = BTreeMap<ListenerId, mpsc::UnboundedSender<SyncEvent>>;

/// Handle returned when subscribing, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Registry of status listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    senders: Mutex<Senders>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns the receiving end of its channel.
    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, tx);
        (id, rx)
    }

    /// Adds a callback listener. The callback runs on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_callback<F>(&self, mut callback: F) -> ListenerId
    where
        F: FnMut(SyncEvent) + Send + 'static,
    {
        let (id, mut rx) = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
        });
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Sends `event` to every listener without waiting.
    pub fn broadcast(&self, event: SyncEvent) {
        self.lock().retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
