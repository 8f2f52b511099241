// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue commands.

use chrono::Utc;
use serde_json::Value;

use rp_core::{OpKind, SyncOperation};

use super::open_queue;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::sync::OfflineQueue;

/// Queue an operation and print its id.
pub fn add(
    config: &ClientConfig,
    resource: &str,
    kind: OpKind,
    payload: &str,
    id: Option<String>,
) -> Result<()> {
    let queue = open_queue(config)?;
    let id = add_impl(&queue, resource, kind, payload, id)?;
    println!("{}", id);
    Ok(())
}

fn add_impl(
    queue: &OfflineQueue,
    resource: &str,
    kind: OpKind,
    payload: &str,
    id: Option<String>,
) -> Result<String> {
    let payload: Value = serde_json::from_str(payload)?;
    let op = match id {
        Some(id) => SyncOperation::with_id(id, kind, resource, payload, Utc::now())?,
        None => SyncOperation::new(kind, resource, payload, Utc::now())?,
    };
    Ok(queue.enqueue(&op)?)
}

/// Print pending operations, oldest first.
pub fn list(config: &ClientConfig, json: bool) -> Result<()> {
    let queue = open_queue(config)?;
    let ops = queue.list_pending()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
    } else if ops.is_empty() {
        println!("No pending operations");
    } else {
        for op in &ops {
            println!("{}", format_op(op));
        }
    }
    Ok(())
}

fn format_op(op: &SyncOperation) -> String {
    let mut line = format!(
        "{}  {:<6} {}  queued {}",
        op.id,
        op.kind,
        op.resource,
        op.enqueued_at.format("%Y-%m-%d %H:%M:%S")
    );
    if op.retry_count > 0 {
        line.push_str(&format!("  retries {}", op.retry_count));
    }
    if let Some(ref err) = op.last_error {
        line.push_str(&format!("  last error: {}", err));
    }
    line
}

/// Remove an operation without replaying it.
pub fn remove(config: &ClientConfig, id: &str) -> Result<()> {
    let queue = open_queue(config)?;
    remove_impl(&queue, id)?;
    println!("Dropped {}", id);
    Ok(())
}

fn remove_impl(queue: &OfflineQueue, id: &str) -> Result<()> {
    if queue.remove(id)? {
        Ok(())
    } else {
        Err(Error::OperationNotFound(id.to_string()))
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
