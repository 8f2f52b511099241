// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-resource replay handlers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rp_core::{IdempotencyKey, SyncOperation};

use super::transport::TransportError;

/// Why a replay attempt failed. Every variant counts as one failed attempt.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Boxed future returned by [`SyncHandler::replay`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, HandlerError>> + Send>>;

/// Replays one queued operation against the remote service.
///
/// `key` is derived from the operation id and must be sent with the call so
/// a replay that already reached the server is answered from its record.
pub trait SyncHandler: Send + Sync {
    fn replay(&self, op: SyncOperation, key: IdempotencyKey) -> HandlerFuture;
}

impl<F, Fut> SyncHandler for F
where
    F: Fn(SyncOperation, IdempotencyKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    fn replay(&self, op: SyncOperation, key: IdempotencyKey) -> HandlerFuture {
        Box::pin(self(op, key))
    }
}
