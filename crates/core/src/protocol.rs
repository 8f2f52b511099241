// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for client-server communication.
//!
//! The protocol is request/response over a single connection:
//! - Client sends endpoint requests (optionally carrying an idempotency key)
//! - Server answers each with a response, a rate-limit rejection or an error,
//!   echoing the client's `request_id`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header names mirroring the common HTTP conventions.
pub mod headers {
    pub const RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
    pub const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
    pub const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";
    pub const IDEMPOTENT_REPLAYED: &str = "Idempotent-Replayed";
    pub const IDEMPOTENT_ORIGINAL_DATE: &str = "Idempotent-Original-Date";
}

/// A call to a server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Client-chosen id echoed in the answer.
    pub request_id: u64,
    pub endpoint: String,
    /// Authenticated subject, if any. Falls back to the peer address for
    /// rate limiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Raw key as sent by the client; validated by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Whether a response was computed now or replayed from an earlier attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplayInfo {
    pub replayed: bool,
    /// When the original attempt was recorded; only set on replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_at: Option<DateTime<Utc>>,
}

impl ReplayInfo {
    pub fn fresh() -> Self {
        ReplayInfo::default()
    }

    pub fn replayed(original_at: DateTime<Utc>) -> Self {
        ReplayInfo {
            replayed: true,
            original_at: Some(original_at),
        }
    }

    /// Header rendering of the replay marker.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![(headers::IDEMPOTENT_REPLAYED, self.replayed.to_string())];
        if let Some(at) = self.original_at {
            out.push((headers::IDEMPOTENT_ORIGINAL_DATE, at.to_rfc3339()));
        }
        out
    }
}

/// Rate-limit state reported alongside every rate-limited endpoint answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Unix time (seconds) at which the current window resets.
    pub reset: u64,
}

impl RateLimitInfo {
    /// Header rendering, adding `Retry-After` when given.
    pub fn headers(&self, retry_after_secs: Option<u64>) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (headers::RATE_LIMIT_LIMIT, self.limit.to_string()),
            (headers::RATE_LIMIT_REMAINING, self.remaining.to_string()),
            (headers::RATE_LIMIT_RESET, self.reset.to_string()),
        ];
        if let Some(secs) = retry_after_secs {
            out.push((headers::RETRY_AFTER, secs.to_string()));
        }
        out
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Call an endpoint.
    Request(Request),

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Endpoint result, fresh or replayed.
    Response {
        request_id: u64,
        status: u16,
        #[serde(default)]
        body: serde_json::Value,
        #[serde(default)]
        replay: ReplayInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate_limit: Option<RateLimitInfo>,
    },

    /// The caller exceeded its rate limit; nothing was executed.
    RateLimited {
        request_id: u64,
        retry_after_secs: u64,
        rate_limit: RateLimitInfo,
    },

    /// The request was rejected or failed.
    Error {
        /// Absent when the request itself could not be parsed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        status: u16,
        message: String,
    },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },
}

impl ClientMessage {
    /// Creates a Request message.
    pub fn request(request: Request) -> Self {
        ClientMessage::Request(request)
    }

    /// Creates a Ping message.
    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates an Error message.
    pub fn error(request_id: Option<u64>, status: u16, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id,
            status,
            message: message.into(),
        }
    }

    /// Creates a Pong message.
    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    /// The request this message answers, if any.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Response { request_id, .. }
            | ServerMessage::RateLimited { request_id, .. } => Some(*request_id),
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Pong { .. } => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
