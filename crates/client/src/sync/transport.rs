// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of the WebSocket link.
//!
//! Replay code talks to a [`Transport`], never to a socket, so the sync
//! manager and remote handler run against scripted transports in tests.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use rp_core::protocol::{ClientMessage, ServerMessage};

use crate::config::BackoffConfig;

/// Why a transport call failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer went away or no connection was open.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded as a protocol message.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("gave up after {attempts} connection attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// A message-oriented connection to rampartd.
pub trait Transport: Send + Sync {
    /// Opens a connection to `url`, replacing any previous one.
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()>;

    /// Next protocol message, or `None` once the peer has closed.
    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>>;

    fn is_connected(&self) -> bool;
}

/// Connects with exponential backoff.
///
/// Makes up to `backoff.max_attempts` attempts, sleeping
/// [`BackoffConfig::delay_for`] between them.
pub async fn connect_with_retry<T: Transport + ?Sized>(
    transport: &mut T,
    url: &str,
    backoff: &BackoffConfig,
) -> TransportResult<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.connect(url).await {
            Ok(()) => {
                debug!(url, attempt, "connected");
                return Ok(());
            }
            Err(e) if attempt >= backoff.max_attempts => {
                warn!(url, attempt, error = %e, "giving up on connection");
                return Err(TransportError::RetriesExhausted {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
            Err(e) => {
                let delay = backoff.delay_for(attempt);
                debug!(url, attempt, error = %e, ?delay, "connection failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Transport`] over tokio-tungstenite.
#[derive(Default)]
pub struct WebSocketTransport {
    link: Option<Link>,
}

/// Both halves of an open socket.
struct Link {
    writer: SplitSink<Socket, Message>,
    reader: SplitStream<Socket>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&mut self) -> TransportResult<&mut Link> {
        self.link.as_mut().ok_or(TransportError::ConnectionClosed)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            let (writer, reader) = socket.split();
            self.link = Some(Link { writer, reader });
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut link) = self.link.take() {
                let _ = link.writer.close().await;
            }
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let text = msg
                .to_json()
                .map_err(|e| TransportError::Malformed(e.to_string()))?;
            let result = self.link()?.writer.send(Message::Text(text.into())).await;
            result.map_err(|e| {
                self.link = None;
                TransportError::SendFailed(e.to_string())
            })
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            loop {
                let frame = self.link()?.reader.next().await;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        return ServerMessage::from_json(text.as_str())
                            .map(Some)
                            .map_err(|e| TransportError::Malformed(e.to_string()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.link = None;
                        return Ok(None);
                    }
                    // Control and binary frames carry no protocol messages
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.link = None;
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
