// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Each text frame is one [`ClientMessage`]. Requests pass through the
//! pipeline below and every request gets exactly one answer carrying its
//! `request_id`:
//!
//! 1. route lookup (unknown endpoint: 404)
//! 2. rate limit check for the route's class (denied: `rate_limited`)
//! 3. idempotency key validation (malformed: 400, missing where required: 428)
//! 4. execution, through the idempotency coordinator for keyed mutations

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rp_core::protocol::{ClientMessage, ReplayInfo, Request, ServerMessage};
use rp_core::IdempotencyKey;

use crate::error::{Error, Result};
use crate::idempotency::Outcome;
use crate::router::ActionContext;
use crate::state::ServerState;
use crate::sweep;

/// Binds the configured address and serves until `cancel` fires.
pub async fn run(state: ServerState, cancel: CancellationToken) -> Result<()> {
    let addr = state.config().bind;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", listener.local_addr()?);

    let sweeps = sweep::spawn(&state, cancel.clone());
    let result = serve(listener, state, cancel).await;
    for handle in sweeps {
        let _ = handle.await;
    }
    result
}

/// Accepts connections on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutting down listener");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let state = state.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer_addr, state, cancel).await {
                        error!("Connection error from {}: {}", peer_addr, e);
                    }
                });
            }
        }
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ServerState,
    cancel: CancellationToken,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("New WebSocket connection from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let peer = peer_addr.ip().to_string();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_client_message(text.as_str(), &peer, &state).await;
                        let json = response.to_json()?;
                        ws_sink.send(Message::Text(json.into())).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong and raw frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Turns one client frame into its answer.
///
/// `peer` is the rate limit identity. The request's `user_id` only scopes
/// idempotency records and falls back to `peer` when absent.
pub async fn handle_client_message(text: &str, peer: &str, state: &ServerState) -> ServerMessage {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Unparseable message from {}: {}", peer, e);
            return ServerMessage::error(None, 400, format!("invalid message: {e}"));
        }
    };

    match msg {
        ClientMessage::Ping { id } => ServerMessage::pong(id),
        ClientMessage::Request(request) => handle_request(request, peer, state).await,
    }
}

async fn handle_request(request: Request, peer: &str, state: &ServerState) -> ServerMessage {
    let request_id = request.request_id;
    let route = match state.router().get(&request.endpoint) {
        Ok(route) => route,
        Err(e) => return ServerMessage::error(Some(request_id), e.status(), e.to_string()),
    };

    let decision = state.limiter().check_class(
        peer,
        route.policy.class,
        &state.config().rate_limits,
    );
    if !decision.allowed {
        return ServerMessage::RateLimited {
            request_id,
            retry_after_secs: decision.retry_after_secs.unwrap_or(1),
            rate_limit: decision.info(),
        };
    }

    let key = match parse_key(
        request.idempotency_key.as_deref(),
        &request.endpoint,
        route.policy.requires_key,
    ) {
        Ok(key) => key,
        Err(e) => return ServerMessage::error(Some(request_id), e.status(), e.to_string()),
    };

    let user_id = request.user_id.unwrap_or_else(|| peer.to_string());
    let ctx = ActionContext {
        user_id: user_id.clone(),
        endpoint: request.endpoint.clone(),
        payload: request.payload,
        idempotency_key: key.clone(),
    };

    let result = match (&key, route.policy.mutating) {
        (Some(key), true) => {
            state
                .coordinator()
                .execute(key, &user_id, &request.endpoint, || route.call(ctx))
                .await
        }
        _ => route.call(ctx).await.map(Outcome::Fresh),
    };

    match result {
        Ok(outcome) => {
            let replay = match outcome.original_at() {
                Some(at) => ReplayInfo::replayed(at),
                None => ReplayInfo::fresh(),
            };
            if replay.replayed {
                debug!(endpoint = %request.endpoint, request_id, "replayed response");
            }
            let response = outcome.into_response();
            ServerMessage::Response {
                request_id,
                status: response.status,
                body: response.body,
                replay,
                rate_limit: Some(decision.info()),
            }
        }
        Err(e) => {
            debug!(endpoint = %request.endpoint, request_id, error = %e, "request failed");
            ServerMessage::error(Some(request_id), e.status(), e.to_string())
        }
    }
}

fn parse_key(raw: Option<&str>, endpoint: &str, required: bool) -> Result<Option<IdempotencyKey>> {
    match raw {
        Some(raw) => Ok(Some(IdempotencyKey::parse(raw)?)),
        None if required => Err(Error::MissingIdempotencyKey(endpoint.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
