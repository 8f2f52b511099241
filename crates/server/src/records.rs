// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Generic record actions.
//!
//! A small document store keyed by `(resource, id)` that gives the server
//! real mutations to deduplicate. Each configured resource gets five
//! endpoints:
//!
//! | endpoint              | policy | payload                  |
//! |-----------------------|--------|--------------------------|
//! | `/{resource}/create`  | write  | `{"id"?, "data"}`        |
//! | `/{resource}/update`  | write  | `{"id", "data"}`         |
//! | `/{resource}/delete`  | write  | `{"id"}`                 |
//! | `/{resource}/get`     | read   | `{"id"}`                 |
//! | `/{resource}/stats`   | read   | none                     |
//!
//! `stats` is an aggregate served through the TTL cache; writes to a
//! resource invalidate its cached value. Actions run on tokio's blocking
//! pool since SQLite may wait on a busy lock.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use rp_core::{SharedClock, TtlCache};

use crate::error::{Error, Result};
use crate::idempotency::StoredResponse;
use crate::router::{Action, ActionContext, Router, RoutePolicy};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    resource TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (resource, id)
);
"#;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub resource: String,
    pub id: String,
    pub data: Value,
    /// Starts at 1 and increases on every update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed record storage.
pub struct RecordStore {
    conn: Mutex<Connection>,
    clock: SharedClock,
    stats: TtlCache<Value>,
    stats_ttl: Duration,
}

impl RecordStore {
    pub fn open(path: &Path, clock: SharedClock, stats_ttl: Duration) -> Result<Self> {
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
        Self::init(conn, clock, stats_ttl)
    }

    pub fn open_in_memory(clock: SharedClock, stats_ttl: Duration) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, clock, stats_ttl)
    }

    fn init(conn: Connection, clock: SharedClock, stats_ttl: Duration) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(RecordStore {
            conn: Mutex::new(conn),
            stats: TtlCache::new(Arc::clone(&clock)),
            clock,
            stats_ttl,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a record, generating an id when none is given.
    pub fn create(&self, resource: &str, id: Option<&str>, data: Value) -> Result<Record> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = self.clock.now();
        let text = serde_json::to_string(&data)?;

        let result = self.conn().execute(
            "INSERT INTO records (resource, id, data, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![resource, id, text, now.to_rfc3339()],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::Conflict(format!("{resource}/{id}")));
            }
            Err(e) => return Err(e.into()),
        }

        self.stats.remove(resource);
        debug!(resource, id = %id, "record created");
        Ok(Record {
            resource: resource.to_string(),
            id,
            data,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces a record's data and bumps its version.
    pub fn update(&self, resource: &str, id: &str, data: Value) -> Result<Record> {
        let now = self.clock.now();
        let text = serde_json::to_string(&data)?;
        let affected = self.conn().execute(
            "UPDATE records SET data = ?3, version = version + 1, updated_at = ?4
             WHERE resource = ?1 AND id = ?2",
            params![resource, id, text, now.to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(Error::NotFound(format!("{resource}/{id}")));
        }
        self.stats.remove(resource);
        debug!(resource, id, "record updated");
        self.get(resource, id)
    }

    /// Deletes a record, returning what was removed.
    pub fn delete(&self, resource: &str, id: &str) -> Result<Record> {
        let record = self.get(resource, id)?;
        self.conn().execute(
            "DELETE FROM records WHERE resource = ?1 AND id = ?2",
            params![resource, id],
        )?;
        self.stats.remove(resource);
        debug!(resource, id, "record deleted");
        Ok(record)
    }

    pub fn get(&self, resource: &str, id: &str) -> Result<Record> {
        let raw: Option<(String, i64, String, String)> = self
            .conn()
            .query_row(
                "SELECT data, version, created_at, updated_at
                 FROM records WHERE resource = ?1 AND id = ?2",
                params![resource, id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (data, version, created_at, updated_at) =
            raw.ok_or_else(|| Error::NotFound(format!("{resource}/{id}")))?;

        Ok(Record {
            resource: resource.to_string(),
            id: id.to_string(),
            data: serde_json::from_str(&data)?,
            version: u64::try_from(version).unwrap_or(0),
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    /// Record count and last write time for `resource`, cached for the stats TTL.
    pub fn stats(&self, resource: &str) -> Result<Value> {
        self.stats
            .try_get_or_insert_with(resource, self.stats_ttl, || self.compute_stats(resource))
    }

    fn compute_stats(&self, resource: &str) -> Result<Value> {
        let (count, last): (i64, Option<String>) = self.conn().query_row(
            "SELECT COUNT(*), MAX(updated_at) FROM records WHERE resource = ?1",
            params![resource],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        debug!(resource, count, "stats computed");
        Ok(json!({
            "resource": resource,
            "count": count,
            "last_updated_at": last,
        }))
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Config(format!("corrupted timestamp '{s}': {e}")))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Core(rp_core::Error::InvalidInput(message.into()))
}

fn payload_id(payload: &Value) -> Result<Option<&str>> {
    match payload.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s)),
        Some(_) => Err(invalid("'id' must be a non-empty string")),
    }
}

fn required_id(payload: &Value) -> Result<&str> {
    payload_id(payload)?.ok_or_else(|| invalid("missing 'id'"))
}

fn payload_data(payload: &Value) -> Option<Value> {
    payload.get("data").cloned()
}

fn to_body(record: &Record) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

fn create_action(store: &RecordStore, resource: &str, payload: &Value) -> Result<StoredResponse> {
    let data = payload_data(payload).unwrap_or_else(|| json!({}));
    let record = store.create(resource, payload_id(payload)?, data)?;
    Ok(StoredResponse::new(201, to_body(&record)?))
}

fn update_action(store: &RecordStore, resource: &str, payload: &Value) -> Result<StoredResponse> {
    let id = required_id(payload)?;
    let data = payload_data(payload).ok_or_else(|| invalid("missing 'data'"))?;
    let record = store.update(resource, id, data)?;
    Ok(StoredResponse::ok(to_body(&record)?))
}

fn delete_action(store: &RecordStore, resource: &str, payload: &Value) -> Result<StoredResponse> {
    let record = store.delete(resource, required_id(payload)?)?;
    Ok(StoredResponse::ok(json!({"id": record.id, "deleted": true})))
}

fn get_action(store: &RecordStore, resource: &str, payload: &Value) -> Result<StoredResponse> {
    let record = store.get(resource, required_id(payload)?)?;
    Ok(StoredResponse::ok(to_body(&record)?))
}

fn stats_action(store: &RecordStore, resource: &str, _payload: &Value) -> Result<StoredResponse> {
    Ok(StoredResponse::ok(store.stats(resource)?))
}

type RecordFn = fn(&RecordStore, &str, &Value) -> Result<StoredResponse>;

/// Wraps `f` as an action that runs on the blocking pool.
fn bind(store: &Arc<RecordStore>, resource: &str, f: RecordFn) -> impl Action + 'static {
    let store = Arc::clone(store);
    let resource = resource.to_string();
    move |ctx: ActionContext| {
        let store = Arc::clone(&store);
        let resource = resource.clone();
        async move {
            tokio::task::spawn_blocking(move || f(&store, &resource, &ctx.payload))
                .await
                .unwrap_or_else(|e| Err(Error::Action(format!("record task failed: {e}"))))
        }
    }
}

/// Registers the record endpoints for each resource.
pub fn register_routes(
    router: &mut Router,
    store: &Arc<RecordStore>,
    resources: &[String],
) -> Result<()> {
    let table: [(&str, RoutePolicy, RecordFn); 5] = [
        ("create", RoutePolicy::write(), create_action),
        ("update", RoutePolicy::write(), update_action),
        ("delete", RoutePolicy::write(), delete_action),
        ("get", RoutePolicy::read(), get_action),
        ("stats", RoutePolicy::read(), stats_action),
    ];
    for resource in resources {
        for (verb, policy, f) in table {
            router.add(format!("/{resource}/{verb}"), policy, bind(store, resource, f))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
