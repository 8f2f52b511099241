// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `rampart sync` against a live rampartd.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use rp_core::SystemClock;
use rpserver::{Router, ServerConfig, ServerState};

/// An in-process server on an ephemeral port.
struct Server {
    // Serves connections until dropped
    _runtime: Runtime,
    state: ServerState,
    url: String,
    cancel: CancellationToken,
}

impl Server {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let config = ServerConfig {
            resources: vec!["leave".to_string()],
            ..ServerConfig::default()
        };
        let state = ServerState::in_memory(config, SystemClock::shared(), Router::new()).unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        runtime.spawn(rpserver::server::serve(listener, state.clone(), cancel.clone()));
        Server {
            _runtime: runtime,
            state,
            url,
            cancel,
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Env {
    dir: TempDir,
}

impl Env {
    fn new(server_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            r#"server_url = "{server_url}"
queue_path = "{}"
user_id = "alice"
resources = ["leave"]
request_timeout_secs = 2

[backoff]
initial_delay_ms = 10
max_delay_secs = 1
max_attempts = 2
"#,
            dir.path().join("queue.db").display()
        );
        std::fs::write(dir.path().join("rampart.toml"), config).unwrap();
        Env { dir }
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("rampart");
        cmd.arg("--config").arg(self.dir.path().join("rampart.toml"));
        cmd
    }

    fn add(&self, args: &[&str]) -> String {
        let output = self
            .cmd()
            .args(["queue", "add"])
            .args(args)
            .output()
            .unwrap();
        assert!(output.status.success(), "add failed: {output:?}");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn pending(&self) -> Vec<serde_json::Value> {
        let output = self.cmd().args(["queue", "list", "--json"]).output().unwrap();
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn unused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("ws://{}", listener.local_addr().unwrap())
}

#[test]
fn sync_with_empty_queue() {
    let server = Server::start();
    let env = Env::new(&server.url);
    env.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to sync"));
}

#[test]
fn sync_replays_and_empties_queue() {
    let server = Server::start();
    let env = Env::new(&server.url);
    env.add(&["leave", "-p", r#"{"id":"L-1","data":{"days":2}}"#]);
    env.add(&["leave", "-t", "update", "-p", r#"{"id":"L-1","data":{"days":4}}"#]);

    env.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 2 of 2"));

    assert!(env.pending().is_empty());
    let record = server.state.records().get("leave", "L-1").unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.data["days"], 4);
}

#[test]
fn replaying_an_already_applied_operation_is_harmless() {
    let server = Server::start();
    let env = Env::new(&server.url);
    let payload = r#"{"id":"L-2"}"#;

    // Same operation id queued again after a first successful sync
    env.add(&["leave", "--id", "leave-create-l2-op", "-p", payload]);
    env.cmd().arg("sync").assert().success();
    env.add(&["leave", "--id", "leave-create-l2-op", "-p", payload]);
    env.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 of 1"));

    assert_eq!(server.state.records().get("leave", "L-2").unwrap().version, 1);
}

#[test]
fn unreachable_server_leaves_queue_untouched() {
    let env = Env::new(&unused_url());
    let id = env.add(&["leave"]);

    for _ in 0..4 {
        env.cmd()
            .arg("sync")
            .assert()
            .success()
            .stdout(predicate::str::contains("Offline"))
            .stdout(predicate::str::contains("1 operation(s) left queued"));
    }

    let pending = env.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], id.as_str());
    assert_eq!(pending[0]["retry_count"], 0);
    assert!(pending[0]["last_error"].is_null());
}

#[test]
fn operation_is_dropped_after_three_rejected_syncs() {
    let server = Server::start();
    let env = Env::new(&server.url);
    let id = env.add(&["leave", "-t", "update", "-p", r#"{"id":"gone","data":{}}"#]);

    for _ in 0..2 {
        env.cmd()
            .arg("sync")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 retried"));
    }
    env.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 dropped"))
        .stderr(predicate::str::contains(format!("dropped {id}")));

    assert!(env.pending().is_empty());
}

#[test]
fn rejected_operation_counts_as_failure() {
    let server = Server::start();
    let env = Env::new(&server.url);
    // Update of a record that does not exist
    env.add(&["leave", "-t", "update", "-p", r#"{"id":"nope","data":{}}"#]);

    env.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 retried"));

    let pending = env.pending();
    assert!(pending[0]["last_error"].as_str().unwrap().contains("404"));
}

#[test]
fn concurrent_sync_is_refused() {
    let env = Env::new(&unused_url());
    let lock_path = env.dir.path().join("queue.lock");
    let file = std::fs::File::create(&lock_path).unwrap();
    fs2::FileExt::try_lock_exclusive(&file).unwrap();

    env.cmd()
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("another sync is already running"));
}
