// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::error::Error;
use crate::idempotency::{SqliteIdempotencyStore, StoreResult};
use rp_core::ManualClock;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const T0: u64 = 1_700_000_000_000;

fn key(s: &str) -> IdempotencyKey {
    IdempotencyKey::parse(s).unwrap()
}

fn coordinator(clock: &ManualClock) -> IdempotencyCoordinator<SqliteIdempotencyStore> {
    IdempotencyCoordinator::new(
        Arc::new(SqliteIdempotencyStore::open_in_memory().unwrap()),
        clock.shared(),
        CoordinatorConfig {
            poll_interval: Duration::from_millis(2),
            ..CoordinatorConfig::default()
        },
    )
}

/// Operation that counts its executions and echoes the count.
async fn counted(counter: &AtomicUsize) -> Result<StoredResponse> {
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(StoredResponse::new(201, json!({"execution": n})))
}

#[tokio::test]
async fn first_call_runs_and_repeat_replays() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = AtomicUsize::new(0);
    let k = key("abc123-submit-attempt");

    let first = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    assert_eq!(
        first,
        Outcome::Fresh(StoredResponse::new(201, json!({"execution": 1})))
    );

    clock.advance(Duration::from_secs(5));
    let second = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(second.is_replayed());
    assert_eq!(second.response(), first.response());
    assert_eq!(
        second.original_at().unwrap().timestamp_millis(),
        i64::try_from(T0).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_execute_once() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = Arc::new(AtomicUsize::new(0));
    let k = key("concurrent-submit-attempt");

    let mut handles = Vec::new();
    for _ in 0..32 {
        let coord = coord.clone();
        let counter = Arc::clone(&counter);
        let k = k.clone();
        handles.push(tokio::spawn(async move {
            coord
                .execute(&k, "alice", "/orders/create", || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    counted(&counter).await
                })
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(outcomes.iter().filter(|o| !o.is_replayed()).count(), 1);
    for outcome in &outcomes {
        assert_eq!(outcome.response().body, json!({"execution": 1}));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn instances_sharing_a_database_execute_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idempotency.db");
    let clock = ManualClock::new(T0);
    let config = CoordinatorConfig {
        poll_interval: Duration::from_millis(2),
        ..CoordinatorConfig::default()
    };
    let instances = [
        IdempotencyCoordinator::new(
            Arc::new(SqliteIdempotencyStore::open(&path).unwrap()),
            clock.shared(),
            config,
        ),
        IdempotencyCoordinator::new(
            Arc::new(SqliteIdempotencyStore::open(&path).unwrap()),
            clock.shared(),
            config,
        ),
    ];
    let counter = Arc::new(AtomicUsize::new(0));
    let k = key("multi-instance-attempt");

    let mut handles = Vec::new();
    for i in 0..16 {
        let coord = instances[i % 2].clone();
        let counter = Arc::clone(&counter);
        let k = k.clone();
        handles.push(tokio::spawn(async move {
            coord
                .execute(&k, "alice", "/orders/create", || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    counted(&counter).await
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.response().body, json!({"execution": 1}));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn records_are_scoped_by_user_and_endpoint() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = AtomicUsize::new(0);
    let k = key("shared-client-token");

    coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    let other_user = coord
        .execute(&k, "bob", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    let other_endpoint = coord
        .execute(&k, "alice", "/orders/delete", || counted(&counter))
        .await
        .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(!other_user.is_replayed());
    assert!(!other_endpoint.is_replayed());
}

#[tokio::test]
async fn failed_operation_is_not_recorded() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = AtomicUsize::new(0);
    let k = key("payment-attempt-one");

    let err = coord
        .execute(&k, "alice", "/payments/create", || async {
            Err(Error::Action("card declined".to_string()))
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("card declined"));

    let retry = coord
        .execute(&k, "alice", "/payments/create", || counted(&counter))
        .await
        .unwrap();
    assert!(!retry.is_replayed());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoned_claim_is_taken_over_after_timeout() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = AtomicUsize::new(0);
    let k = key("crashed-worker-attempt");
    let scope = Scope::new(k.clone(), "alice", "/orders/create");

    // A worker claimed the key and then died
    assert!(matches!(
        coord.store().insert_claim(&scope, T0).unwrap(),
        InsertOutcome::Inserted(_)
    ));

    clock.advance(Duration::from_secs(31));
    let outcome = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();

    assert!(!outcome.is_replayed());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_records_are_purged() {
    let clock = ManualClock::new(T0);
    let coord = coordinator(&clock);
    let counter = AtomicUsize::new(0);
    let k = key("day-old-request-key");

    coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(23 * 60 * 60));
    assert_eq!(coord.purge_expired().unwrap(), 0);

    clock.advance(Duration::from_secs(2 * 60 * 60));
    assert_eq!(coord.purge_expired().unwrap(), 1);

    let again = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    assert!(!again.is_replayed());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

/// Store whose writes always fail, as with a full disk.
struct BrokenStore;

impl IdempotencyStore for BrokenStore {
    fn find(&self, _scope: &Scope) -> StoreResult<Option<RecordState>> {
        Ok(None)
    }

    fn insert_claim(&self, _scope: &Scope, _now_ms: u64) -> StoreResult<InsertOutcome> {
        Err(StoreError::CorruptedData("disk full".to_string()))
    }

    fn take_over(&self, _: &Scope, _: u64, _: u64) -> StoreResult<Option<ClaimToken>> {
        Ok(None)
    }

    fn complete(&self, _: &Scope, _: &ClaimToken, _: &StoredResponse, _: u64) -> StoreResult<()> {
        Err(StoreError::ClaimLost)
    }

    fn release(&self, _: &Scope, _: &ClaimToken) -> StoreResult<()> {
        Ok(())
    }

    fn purge_older_than(&self, _cutoff_ms: u64) -> StoreResult<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn store_failure_still_executes_operation() {
    let clock = ManualClock::new(T0);
    let coord = IdempotencyCoordinator::new(
        Arc::new(BrokenStore),
        clock.shared(),
        CoordinatorConfig::default(),
    );
    let counter = AtomicUsize::new(0);
    let k = key("unrecorded-request-key");

    let outcome = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Fresh(StoredResponse::new(201, json!({"execution": 1})))
    );
}

/// SQLite store that notes which thread each call ran on.
struct ThreadTrackingStore {
    inner: SqliteIdempotencyStore,
    threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
}

impl ThreadTrackingStore {
    fn new() -> Self {
        ThreadTrackingStore {
            inner: SqliteIdempotencyStore::open_in_memory().unwrap(),
            threads: Default::default(),
        }
    }

    fn store(&self) -> &SqliteIdempotencyStore {
        self.threads.lock().unwrap().push(std::thread::current().id());
        &self.inner
    }
}

impl IdempotencyStore for ThreadTrackingStore {
    fn find(&self, scope: &Scope) -> StoreResult<Option<RecordState>> {
        self.store().find(scope)
    }

    fn insert_claim(&self, scope: &Scope, now_ms: u64) -> StoreResult<InsertOutcome> {
        self.store().insert_claim(scope, now_ms)
    }

    fn take_over(&self, scope: &Scope, stale: u64, now: u64) -> StoreResult<Option<ClaimToken>> {
        self.store().take_over(scope, stale, now)
    }

    fn complete(
        &self,
        scope: &Scope,
        token: &ClaimToken,
        response: &StoredResponse,
        now_ms: u64,
    ) -> StoreResult<()> {
        self.store().complete(scope, token, response, now_ms)
    }

    fn release(&self, scope: &Scope, token: &ClaimToken) -> StoreResult<()> {
        self.store().release(scope, token)
    }

    fn purge_older_than(&self, cutoff_ms: u64) -> StoreResult<usize> {
        self.store().purge_older_than(cutoff_ms)
    }
}

#[tokio::test]
async fn store_calls_stay_off_the_runtime_thread() {
    let clock = ManualClock::new(T0);
    let store = Arc::new(ThreadTrackingStore::new());
    let coord = IdempotencyCoordinator::new(
        Arc::clone(&store),
        clock.shared(),
        CoordinatorConfig::default(),
    );
    let counter = AtomicUsize::new(0);
    let k = key("blocking-pool-request");

    coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    let replay = coord
        .execute(&k, "alice", "/orders/create", || counted(&counter))
        .await
        .unwrap();
    assert!(replay.is_replayed());

    let runtime_thread = std::thread::current().id();
    let threads = store.threads.lock().unwrap();
    // find, insert_claim, complete, then the replay's find
    assert_eq!(threads.len(), 4);
    assert!(threads.iter().all(|id| *id != runtime_thread));
}
