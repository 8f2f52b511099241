// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for rp-core operations.

use thiserror::Error;

/// All possible errors that can occur in rp-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid idempotency key: {0}\n  hint: use a UUID or a 16-255 character alphanumeric token")]
    InvalidIdempotencyKey(String),

    #[error("invalid operation type: '{0}'\n  hint: valid types are: create, update, delete")]
    InvalidOpKind(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for rp-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
