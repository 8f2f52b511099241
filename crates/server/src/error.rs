// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the rampartd server.

use thiserror::Error;

use crate::idempotency::StoreError;

/// All possible errors that can occur in the server.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] rp_core::Error),

    #[error("idempotency store error: {0}")]
    Store(#[from] StoreError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid rate limit for '{class}': {reason}")]
    InvalidRateLimit { class: String, reason: String },

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("endpoint {0} requires an idempotency key\n  hint: send a UUID or a 16-255 character token")]
    MissingIdempotencyKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("action failed: {0}")]
    Action(String),
}

impl Error {
    /// Status code reported to the client for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::Core(rp_core::Error::InvalidIdempotencyKey(_))
            | Error::Core(rp_core::Error::InvalidInput(_))
            | Error::Core(rp_core::Error::InvalidOpKind(_))
            | Error::Json(_) => 400,
            Error::MissingIdempotencyKey(_) => 428,
            Error::UnknownEndpoint(_) | Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            _ => 500,
        }
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
