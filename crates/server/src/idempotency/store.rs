// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable idempotency records.
//!
//! A record starts as a *pending claim* inserted before the operation runs.
//! The `(idempotency_key, user_id, endpoint)` uniqueness constraint decides
//! which concurrent attempt owns the claim; the owner later fills in the
//! response and the record becomes immutable until the retention sweep
//! deletes it.
//!
//! Each claim carries a random token so that an owner whose claim was taken
//! over (after the claim timeout) cannot overwrite the new owner's result.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rp_core::clock::ms_to_datetime;
use rp_core::IdempotencyKey;

/// SQL schema for the idempotency store.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS idempotency_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    idempotency_key TEXT NOT NULL,
    user_id TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',  -- pending|complete
    claim_token TEXT,                       -- NULL once complete
    response_status INTEGER,
    response_body TEXT,
    created_at INTEGER NOT NULL,            -- ms since epoch, claim time
    completed_at INTEGER,
    UNIQUE (idempotency_key, user_id, endpoint)
);

CREATE INDEX IF NOT EXISTS idx_idempotency_created ON idempotency_records(created_at);
"#;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// A store call could not finish on the blocking pool.
    #[error("store task failed: {0}")]
    Task(String),

    /// The claim being completed no longer belongs to the caller.
    #[error("idempotency claim no longer held")]
    ClaimLost,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The triple an idempotency record is unique on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub key: IdempotencyKey,
    pub user_id: String,
    pub endpoint: String,
}

impl Scope {
    pub fn new(key: IdempotencyKey, user_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Scope {
            key,
            user_id: user_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// The recorded outcome of a mutating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl StoredResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        StoredResponse { status, body }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }
}

/// A completed idempotency record.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub scope: Scope,
    pub response: StoredResponse,
    pub created_at: DateTime<Utc>,
}

/// What the store currently holds for a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState {
    /// Another attempt holds the claim and has not finished yet.
    Pending { claimed_at_ms: u64 },
    Complete(IdempotencyRecord),
}

/// Proof of owning a pending claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimToken(String);

impl ClaimToken {
    fn generate() -> Self {
        ClaimToken(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of trying to insert a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ClaimToken),
    /// The uniqueness constraint rejected the insert: someone else got there first.
    Conflict,
}

/// Durable storage with an atomic insert-if-absent.
pub trait IdempotencyStore: Send + Sync {
    /// Looks up the record for `scope`.
    fn find(&self, scope: &Scope) -> StoreResult<Option<RecordState>>;

    /// Inserts a pending claim, relying on the uniqueness constraint.
    fn insert_claim(&self, scope: &Scope, now_ms: u64) -> StoreResult<InsertOutcome>;

    /// Re-issues a pending claim created at or before `stale_before_ms`.
    ///
    /// Returns `None` if the claim is gone, complete or still fresh.
    fn take_over(
        &self,
        scope: &Scope,
        stale_before_ms: u64,
        now_ms: u64,
    ) -> StoreResult<Option<ClaimToken>>;

    /// Stores the response and makes the record immutable.
    ///
    /// Fails with [`StoreError::ClaimLost`] if `token` no longer owns the claim.
    fn complete(
        &self,
        scope: &Scope,
        token: &ClaimToken,
        response: &StoredResponse,
        now_ms: u64,
    ) -> StoreResult<()>;

    /// Drops a pending claim so a later attempt can run.
    fn release(&self, scope: &Scope, token: &ClaimToken) -> StoreResult<()>;

    /// Deletes every record created before `cutoff_ms`.
    fn purge_older_than(&self, cutoff_ms: u64) -> StoreResult<usize>;
}

/// SQLite-backed idempotency store.
pub struct SqliteIdempotencyStore {
    conn: Mutex<Connection>,
}

impl SqliteIdempotencyStore {
    /// Open a store at the given path, creating the schema if needed.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        // WAL and a busy timeout let several server processes share the file
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(SqliteIdempotencyStore {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteIdempotencyStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of records, pending or complete.
    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM idempotency_records", [], |row| {
                    row.get(0)
                })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn sql_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

type RawRecord = (String, Option<i64>, Option<String>, i64);

impl IdempotencyStore for SqliteIdempotencyStore {
    fn find(&self, scope: &Scope) -> StoreResult<Option<RecordState>> {
        let raw: Option<RawRecord> = self
            .conn()
            .query_row(
                "SELECT state, response_status, response_body, created_at
                 FROM idempotency_records
                 WHERE idempotency_key = ?1 AND user_id = ?2 AND endpoint = ?3",
                params![scope.key.as_str(), scope.user_id, scope.endpoint],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((state, status, body, created_at)) = raw else {
            return Ok(None);
        };
        let created_at_ms = u64::try_from(created_at).unwrap_or(0);

        match state.as_str() {
            "pending" => Ok(Some(RecordState::Pending {
                claimed_at_ms: created_at_ms,
            })),
            "complete" => {
                let status = status
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| {
                        StoreError::CorruptedData(format!(
                            "invalid response status for key '{}'",
                            scope.key
                        ))
                    })?;
                let body = match body {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Value::Null,
                };
                Ok(Some(RecordState::Complete(IdempotencyRecord {
                    scope: scope.clone(),
                    response: StoredResponse { status, body },
                    created_at: ms_to_datetime(created_at_ms),
                })))
            }
            other => Err(StoreError::CorruptedData(format!(
                "invalid record state '{other}'"
            ))),
        }
    }

    fn insert_claim(&self, scope: &Scope, now_ms: u64) -> StoreResult<InsertOutcome> {
        let token = ClaimToken::generate();
        let result = self.conn().execute(
            "INSERT INTO idempotency_records
                 (idempotency_key, user_id, endpoint, state, claim_token, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
            params![
                scope.key.as_str(),
                scope.user_id,
                scope.endpoint,
                token.as_str(),
                sql_ms(now_ms),
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted(token)),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    fn take_over(
        &self,
        scope: &Scope,
        stale_before_ms: u64,
        now_ms: u64,
    ) -> StoreResult<Option<ClaimToken>> {
        let token = ClaimToken::generate();
        let affected = self.conn().execute(
            "UPDATE idempotency_records SET claim_token = ?4, created_at = ?5
             WHERE idempotency_key = ?1 AND user_id = ?2 AND endpoint = ?3
               AND state = 'pending' AND created_at <= ?6",
            params![
                scope.key.as_str(),
                scope.user_id,
                scope.endpoint,
                token.as_str(),
                sql_ms(now_ms),
                sql_ms(stale_before_ms),
            ],
        )?;
        Ok((affected == 1).then_some(token))
    }

    fn complete(
        &self,
        scope: &Scope,
        token: &ClaimToken,
        response: &StoredResponse,
        now_ms: u64,
    ) -> StoreResult<()> {
        let body = serde_json::to_string(&response.body)?;
        let affected = self.conn().execute(
            "UPDATE idempotency_records
             SET state = 'complete', claim_token = NULL,
                 response_status = ?5, response_body = ?6, completed_at = ?7
             WHERE idempotency_key = ?1 AND user_id = ?2 AND endpoint = ?3
               AND state = 'pending' AND claim_token = ?4",
            params![
                scope.key.as_str(),
                scope.user_id,
                scope.endpoint,
                token.as_str(),
                response.status,
                body,
                sql_ms(now_ms),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::ClaimLost);
        }
        Ok(())
    }

    fn release(&self, scope: &Scope, token: &ClaimToken) -> StoreResult<()> {
        self.conn().execute(
            "DELETE FROM idempotency_records
             WHERE idempotency_key = ?1 AND user_id = ?2 AND endpoint = ?3
               AND state = 'pending' AND claim_token = ?4",
            params![
                scope.key.as_str(),
                scope.user_id,
                scope.endpoint,
                token.as_str()
            ],
        )?;
        Ok(())
    }

    fn purge_older_than(&self, cutoff_ms: u64) -> StoreResult<usize> {
        let deleted = self.conn().execute(
            "DELETE FROM idempotency_records WHERE created_at < ?1",
            params![sql_ms(cutoff_ms)],
        )?;
        Ok(deleted)
    }
}

impl<S: IdempotencyStore + ?Sized> IdempotencyStore for std::sync::Arc<S> {
    fn find(&self, scope: &Scope) -> StoreResult<Option<RecordState>> {
        (**self).find(scope)
    }

    fn insert_claim(&self, scope: &Scope, now_ms: u64) -> StoreResult<InsertOutcome> {
        (**self).insert_claim(scope, now_ms)
    }

    fn take_over(
        &self,
        scope: &Scope,
        stale_before_ms: u64,
        now_ms: u64,
    ) -> StoreResult<Option<ClaimToken>> {
        (**self).take_over(scope, stale_before_ms, now_ms)
    }

    fn complete(
        &self,
        scope: &Scope,
        token: &ClaimToken,
        response: &StoredResponse,
        now_ms: u64,
    ) -> StoreResult<()> {
        (**self).complete(scope, token, response, now_ms)
    }

    fn release(&self, scope: &Scope, token: &ClaimToken) -> StoreResult<()> {
        (**self).release(scope, token)
    }

    fn purge_older_than(&self, cutoff_ms: u64) -> StoreResult<usize> {
        (**self).purge_older_than(cutoff_ms)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
