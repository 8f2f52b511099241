// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde_json::json;

use rp_core::protocol::{ClientMessage, ServerMessage};
use rp_core::{OpKind, SyncOperation};

use super::transport::{Transport, TransportError, TransportFuture};

/// Create a test operation whose id ends in `n`.
pub fn make_test_op(n: u64) -> SyncOperation {
    make_test_op_for("leave", n)
}

/// Create a test operation for `resource` with a stable id.
pub fn make_test_op_for(resource: &str, n: u64) -> SyncOperation {
    SyncOperation::with_id(
        format!("test-op-{resource}-{n:04}"),
        OpKind::Create,
        resource,
        json!({"id": format!("{resource}-{n}"), "data": {"n": n}}),
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
    )
    .unwrap()
}

/// Computes the server's answers to a message sent through [`MockTransport`].
pub type Responder = Arc<dyn Fn(&ClientMessage) -> Vec<ServerMessage> + Send + Sync>;

/// Shared view of a [`MockTransport`] that stays usable after the transport
/// has been moved into a handler.
#[derive(Clone, Default)]
pub struct MockHandle {
    incoming: Arc<Mutex<VecDeque<ServerMessage>>>,
    outgoing: Arc<Mutex<Vec<ClientMessage>>>,
    connect_attempts: Arc<AtomicU32>,
    failing_connects: Arc<AtomicU32>,
}

impl MockHandle {
    /// Add a message that will be returned by recv().
    pub fn queue_incoming(&self, msg: ServerMessage) {
        self.incoming.lock().unwrap().push_back(msg);
    }

    /// All messages that were sent.
    pub fn outgoing(&self) -> Vec<ClientMessage> {
        self.outgoing.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Make the next `n` connects fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }
}

/// Mock transport for testing without real sockets.
pub struct MockTransport {
    connected: bool,
    handle: MockHandle,
    responder: Option<Responder>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            connected: false,
            handle: MockHandle::default(),
            responder: None,
        }
    }

    /// A transport that answers every sent message through `f`.
    pub fn with_responder(
        f: impl Fn(&ClientMessage) -> Vec<ServerMessage> + Send + Sync + 'static,
    ) -> Self {
        MockTransport {
            responder: Some(Arc::new(f)),
            ..MockTransport::new()
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _url: &str) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.handle.connect_attempts.fetch_add(1, Ordering::SeqCst);
            let failing = &self.handle.failing_connects;
            if failing.load(Ordering::SeqCst) > 0 {
                failing.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::ConnectionFailed("mock failure".into()));
            }
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            if let Some(responder) = &self.responder {
                let replies = responder(&msg);
                self.handle.incoming.lock().unwrap().extend(replies);
            }
            self.handle.outgoing.lock().unwrap().push(msg);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            if !self.connected {
                return Err(TransportError::ConnectionClosed);
            }
            let msg = self.handle.incoming.lock().unwrap().pop_front();
            Ok(msg)
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
