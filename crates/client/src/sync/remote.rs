// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote replay over the WebSocket protocol.
//!
//! A [`RemoteHandler`] maps an operation to endpoint `/{resource}/{kind}`,
//! sends the operation id as the idempotency key and waits for the answer
//! carrying its request id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use rp_core::protocol::{ClientMessage, Request, ServerMessage};
use rp_core::{IdempotencyKey, SyncOperation};

use super::handler::{HandlerError, HandlerFuture, SyncHandler};
use super::transport::{connect_with_retry, Transport, TransportError};
use crate::config::{BackoffConfig, ClientConfig};

/// Sends operations to the server through a shared transport.
pub struct RemoteHandler<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: Mutex<T>,
    url: String,
    user_id: Option<String>,
    request_timeout: Duration,
    backoff: BackoffConfig,
    next_request_id: AtomicU64,
}

impl<T: Transport> Clone for RemoteHandler<T> {
    fn clone(&self) -> Self {
        RemoteHandler {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> RemoteHandler<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        RemoteHandler {
            inner: Arc::new(Inner {
                transport: Mutex::new(transport),
                url: config.server_url.clone(),
                user_id: config.user_id.clone(),
                request_timeout: config.request_timeout(),
                backoff: config.backoff,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Calls `endpoint` and returns the response body on a 2xx status.
    pub async fn call(
        &self,
        endpoint: &str,
        key: Option<&IdempotencyKey>,
        payload: Value,
    ) -> Result<Value, HandlerError> {
        let inner = &self.inner;
        let mut transport = inner.transport.lock().await;
        if !transport.is_connected() {
            connect_with_retry(&mut *transport, &inner.url, &inner.backoff).await?;
        }

        let request_id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            request_id,
            endpoint: endpoint.to_string(),
            user_id: inner.user_id.clone(),
            idempotency_key: key.map(|k| k.as_str().to_string()),
            payload,
        };
        debug!(endpoint, request_id, "sending request");
        transport.send(ClientMessage::request(request)).await?;

        let answer = tokio::time::timeout(
            inner.request_timeout,
            recv_answer(&mut *transport, request_id),
        )
        .await;
        match answer {
            Ok(result) => interpret(result?),
            Err(_) => {
                // A late answer must not be read as the reply to a later call
                let _ = transport.disconnect().await;
                Err(HandlerError::Timeout(inner.request_timeout))
            }
        }
    }

    /// Checks that the server answers. Makes a single connection attempt.
    pub async fn ping(&self) -> Result<(), HandlerError> {
        let inner = &self.inner;
        let mut transport = inner.transport.lock().await;
        if !transport.is_connected() {
            transport.connect(&inner.url).await?;
        }

        let id = inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        transport.send(ClientMessage::ping(id)).await?;

        let wait = async {
            loop {
                match transport.recv().await? {
                    Some(ServerMessage::Pong { id: got }) if got == id => return Ok(()),
                    Some(_) => continue,
                    None => return Err(TransportError::ConnectionClosed),
                }
            }
        };
        match tokio::time::timeout(inner.request_timeout, wait).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let _ = transport.disconnect().await;
                Err(HandlerError::Timeout(inner.request_timeout))
            }
        }
    }

    pub async fn disconnect(&self) {
        let _ = self.inner.transport.lock().await.disconnect().await;
    }
}

/// Reads until the message answering `request_id` arrives.
async fn recv_answer<T: Transport + ?Sized>(
    transport: &mut T,
    request_id: u64,
) -> Result<ServerMessage, TransportError> {
    loop {
        match transport.recv().await? {
            Some(msg) => match msg.request_id() {
                Some(id) if id == request_id => return Ok(msg),
                // The server could not parse what we sent
                None if matches!(msg, ServerMessage::Error { .. }) => return Ok(msg),
                _ => debug!(request_id, "skipping unrelated message"),
            },
            None => return Err(TransportError::ConnectionClosed),
        }
    }
}

fn interpret(msg: ServerMessage) -> Result<Value, HandlerError> {
    match msg {
        ServerMessage::Response { status, body, .. } if status < 300 => Ok(body),
        ServerMessage::Response { status, body, .. } => Err(HandlerError::Rejected {
            status,
            message: body.to_string(),
        }),
        ServerMessage::RateLimited {
            retry_after_secs, ..
        } => Err(HandlerError::RateLimited { retry_after_secs }),
        ServerMessage::Error {
            status, message, ..
        } => Err(HandlerError::Rejected { status, message }),
        ServerMessage::Pong { .. } => Err(HandlerError::Other("unexpected pong".to_string())),
    }
}

impl<T: Transport + 'static> SyncHandler for RemoteHandler<T> {
    fn replay(&self, op: SyncOperation, key: IdempotencyKey) -> HandlerFuture {
        let this = self.clone();
        Box::pin(async move { this.call(&op.endpoint(), Some(&key), op.payload).await })
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
