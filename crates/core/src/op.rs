// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queued mutating operations.
//!
//! A [`SyncOperation`] is created when a mutation is attempted while the
//! client is disconnected. Its `id` doubles as the idempotency key used when
//! it is replayed, so a replay that partially succeeded can be retried
//! without applying twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::key::IdempotencyKey;

/// The kind of mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" => Ok(OpKind::Create),
            "update" => Ok(OpKind::Update),
            "delete" => Ok(OpKind::Delete),
            _ => Err(Error::InvalidOpKind(s.to_string())),
        }
    }
}

/// A mutation waiting to be replayed against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique id, also used as the idempotency key on replay.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OpKind,
    /// Resource type, used to pick the replay handler.
    pub resource: String,
    /// Opaque payload handed to the handler.
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Creates a new operation with a fresh UUID id.
    pub fn new(
        kind: OpKind,
        resource: impl Into<String>,
        payload: serde_json::Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::with_id(
            IdempotencyKey::generate().to_string(),
            kind,
            resource,
            payload,
            enqueued_at,
        )
    }

    /// Creates an operation with a caller-chosen id.
    ///
    /// The id must itself be a valid idempotency key.
    pub fn with_id(
        id: impl Into<String>,
        kind: OpKind,
        resource: impl Into<String>,
        payload: serde_json::Value,
        enqueued_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        let resource = resource.into();
        IdempotencyKey::parse(&id)?;
        validate_resource(&resource)?;
        Ok(SyncOperation {
            id,
            kind,
            resource,
            payload,
            enqueued_at,
            retry_count: 0,
            last_error: None,
        })
    }

    /// The idempotency key to send when replaying this operation.
    pub fn idempotency_key(&self) -> Result<IdempotencyKey> {
        IdempotencyKey::parse(&self.id)
    }

    /// The server endpoint this operation maps to: `/{resource}/{kind}`.
    pub fn endpoint(&self) -> String {
        format!("/{}/{}", self.resource, self.kind)
    }

    /// Applies a partial update.
    pub fn apply(&mut self, update: &OpUpdate) {
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(ref last_error) = update.last_error {
            self.last_error = last_error.clone();
        }
        if let Some(ref payload) = update.payload {
            self.payload = payload.clone();
        }
    }
}

/// Resource names become endpoint path segments.
fn validate_resource(resource: &str) -> Result<()> {
    if resource.is_empty() {
        return Err(Error::InvalidInput("resource cannot be empty".to_string()));
    }
    if !resource
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "invalid resource '{resource}': use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

/// A partial update to a queued operation. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpUpdate {
    pub retry_count: Option<u32>,
    /// `Some(None)` clears the last error.
    pub last_error: Option<Option<String>>,
    pub payload: Option<serde_json::Value>,
}

impl OpUpdate {
    /// Records a failed attempt.
    pub fn failure(retry_count: u32, error: impl Into<String>) -> Self {
        OpUpdate {
            retry_count: Some(retry_count),
            last_error: Some(Some(error.into())),
            payload: None,
        }
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
