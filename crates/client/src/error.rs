// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the rampart client.

use thiserror::Error;

use crate::sync::{QueueError, TransportError};

/// All possible errors that can occur in the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] rp_core::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("another sync is already running for {0}\n  hint: wait for it to finish or remove a stale lock file")]
    SyncLocked(String),
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
