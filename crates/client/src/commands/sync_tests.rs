// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::Utc;
use rp_core::{OpKind, SyncOperation};
use serde_json::json;
use tempfile::tempdir;

fn unreachable_config(dir: &Path) -> ClientConfig {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let server_url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    ClientConfig {
        server_url,
        queue_path: Some(dir.join("queue.db")),
        backoff: crate::config::BackoffConfig {
            initial_delay_ms: 5,
            max_delay_secs: 1,
            max_attempts: 2,
        },
        ..ClientConfig::default()
    }
}

#[test]
fn lock_is_exclusive_until_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("queue.lock");

    let held = acquire_lock(&path).unwrap();
    let second = acquire_lock(&path);
    assert!(matches!(second, Err(Error::SyncLocked(p)) if p.ends_with("queue.lock")));

    drop(held);
    assert!(acquire_lock(&path).is_ok());
}

#[test]
fn report_formatting() {
    assert_eq!(format_report(&SyncReport::default()), "Nothing to sync");
    let report = SyncReport {
        attempted: 3,
        succeeded: 2,
        retried: 1,
        dropped: 0,
        remaining: 1,
    };
    assert_eq!(
        format_report(&report),
        "Synced 2 of 3 operation(s): 1 retried, 0 dropped, 1 remaining"
    );
}

#[test]
fn offline_message_counts_pending() {
    assert_eq!(
        format_offline(2),
        "Offline: server unreachable, 2 operation(s) left queued"
    );
}

#[tokio::test]
async fn sync_while_unreachable_leaves_queue_untouched() {
    let dir = tempdir().unwrap();
    let config = unreachable_config(dir.path());
    let op = SyncOperation::new(OpKind::Create, "leave", json!({"id": "L-1"}), Utc::now()).unwrap();
    open_queue(&config).unwrap().enqueue(&op).unwrap();

    for _ in 0..4 {
        run(&config, false).await.unwrap();
    }

    let pending = open_queue(&config).unwrap().list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, op.id);
    assert_eq!(pending[0].retry_count, 0);
    assert_eq!(pending[0].last_error, None);
}
