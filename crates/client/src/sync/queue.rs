// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue for persisting operations when disconnected.
//!
//! Operations live in a SQLite table ordered by an autoincrement sequence
//! number, so `list_pending` always returns them in enqueue order even when
//! two share a timestamp. Every mutation is a single statement or a
//! transaction; a crash never leaves a half-written operation behind.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rp_core::{OpKind, OpUpdate, SyncOperation};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    op_type TEXT NOT NULL,
    resource TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
"#;

const COLUMNS: &str = "id, op_type, resource, payload, enqueued_at, retry_count, last_error";

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation with this id is already queued.
    #[error("operation {0} is already queued")]
    Duplicate(String),

    /// A stored row could not be decoded.
    #[error("corrupted queue entry: {0}")]
    Corrupted(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Durable, ordered store of pending operations.
///
/// Shared by handle; all methods take `&self`.
pub struct OfflineQueue {
    conn: Mutex<Connection>,
}

impl OfflineQueue {
    /// Create or open an offline queue at the given path.
    pub fn open(path: &Path) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(OfflineQueue {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory queue (for testing).
    pub fn open_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(OfflineQueue {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends an operation, returning its id.
    pub fn enqueue(&self, op: &SyncOperation) -> QueueResult<String> {
        let payload = serde_json::to_string(&op.payload)?;
        let result = self.conn().execute(
            "INSERT INTO sync_queue (id, op_type, resource, payload, enqueued_at, retry_count, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                op.id,
                op.kind.as_str(),
                op.resource,
                payload,
                op.enqueued_at.to_rfc3339(),
                op.retry_count,
                op.last_error,
            ],
        );
        match result {
            Ok(_) => Ok(op.id.clone()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(QueueError::Duplicate(op.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All queued operations, oldest first.
    pub fn list_pending(&self) -> QueueResult<Vec<SyncOperation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM sync_queue ORDER BY seq"))?;
        let rows = stmt.query_map([], RawOp::from_row)?;

        let mut ops = Vec::new();
        for row in rows {
            ops.push(row?.decode()?);
        }
        Ok(ops)
    }

    /// Looks up one operation.
    pub fn get(&self, id: &str) -> QueueResult<Option<SyncOperation>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1"),
                params![id],
                RawOp::from_row,
            )
            .optional()?;
        raw.map(RawOp::decode).transpose()
    }

    /// Removes an operation. Returns false if it was not queued.
    pub fn remove(&self, id: &str) -> QueueResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Applies a partial update. Returns false if the operation was not queued.
    pub fn update(&self, id: &str, update: &OpUpdate) -> QueueResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let raw = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1"),
                params![id],
                RawOp::from_row,
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(false);
        };

        let mut op = raw.decode()?;
        op.apply(update);
        tx.execute(
            "UPDATE sync_queue SET payload = ?2, retry_count = ?3, last_error = ?4 WHERE id = ?1",
            params![
                id,
                serde_json::to_string(&op.payload)?,
                op.retry_count,
                op.last_error
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Number of queued operations.
    pub fn count(&self) -> QueueResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Distinct resources with queued operations, sorted.
    pub fn resources(&self) -> QueueResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT resource FROM sync_queue ORDER BY resource")?;
        let resources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(resources)
    }

    /// Drops every queued operation.
    pub fn clear(&self) -> QueueResult<usize> {
        Ok(self.conn().execute("DELETE FROM sync_queue", [])?)
    }

    /// Drops the table so every later statement fails.
    #[cfg(test)]
    pub(crate) fn break_for_test(&self) {
        let _ = self.conn().execute_batch("DROP TABLE sync_queue");
    }
}

/// Column values as stored, before decoding.
struct RawOp {
    id: String,
    op_type: String,
    resource: String,
    payload: String,
    enqueued_at: String,
    retry_count: u32,
    last_error: Option<String>,
}

impl RawOp {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RawOp {
            id: row.get(0)?,
            op_type: row.get(1)?,
            resource: row.get(2)?,
            payload: row.get(3)?,
            enqueued_at: row.get(4)?,
            retry_count: row.get(5)?,
            last_error: row.get(6)?,
        })
    }

    fn decode(self) -> QueueResult<SyncOperation> {
        let kind: OpKind = self
            .op_type
            .parse()
            .map_err(|_| QueueError::Corrupted(format!("{}: type '{}'", self.id, self.op_type)))?;
        let enqueued_at = DateTime::parse_from_rfc3339(&self.enqueued_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| QueueError::Corrupted(format!("{}: enqueued_at: {e}", self.id)))?;
        Ok(SyncOperation {
            id: self.id,
            kind,
            resource: self.resource,
            payload: serde_json::from_str(&self.payload)?,
            enqueued_at,
            retry_count: self.retry_count,
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
