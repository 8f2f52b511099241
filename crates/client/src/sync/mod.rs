// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline operation queue and replay.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ enqueue  ┌──────────────┐
//! │  Mutation   │─────────►│ OfflineQueue │  (SQLite, enqueue order)
//! │  (offline)  │          └──────┬───────┘
//! └─────────────┘                 │ list_pending
//!                                 ▼
//! ┌─────────────┐  events  ┌──────────────┐ replay(op, key) ┌───────────────┐
//! │  Listeners  │◄─────────│ SyncManager  │────────────────►│  SyncHandler  │
//! └─────────────┘          └──────────────┘                 │ (per resource)│
//!                                                           └───────┬───────┘
//!                                                                   ▼
//!                                                           ┌───────────────┐
//!                                                           │   Transport   │──► rampartd
//!                                                           └───────────────┘
//! ```
//!
//! # Features
//!
//! - Durable queue that survives restarts
//! - Operation id sent as the idempotency key on every replay
//! - Bounded retries with a terminal event when an operation is dropped
//! - Automatic reconnect with exponential backoff
//! - Injectable transport trait for testing

mod handler;
mod listener;
mod manager;
mod queue;
mod remote;
mod transport;

pub use handler::{HandlerError, HandlerFuture, SyncHandler};
pub use listener::{ListenerId, ListenerRegistry, SyncEvent, SyncStatus};
pub use manager::{SubmitOutcome, SyncManager, SyncReport, SyncRun};
pub use queue::{OfflineQueue, QueueError, QueueResult};
pub use remote::RemoteHandler;
pub use transport::{
    connect_with_retry, Transport, TransportError, TransportFuture, TransportResult,
    WebSocketTransport,
};

#[cfg(test)]
mod test_helpers;
