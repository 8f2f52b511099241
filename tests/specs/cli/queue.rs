// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for the `rampart queue` commands.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let queue = dir.path().join("data").join("queue.db");
        let config = format!(
            "server_url = \"ws://127.0.0.1:9\"\nqueue_path = \"{}\"\n",
            queue.display()
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

    fn list_json(&self) -> Vec<serde_json::Value> {
        let output = self.cmd().args(["queue", "list", "--json"]).output().unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

#[test]
fn list_empty_queue() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending operations"));
}

#[test]
fn add_prints_generated_uuid() {
    let env = Env::new();
    let id = env.add(&["leave", "--payload", r#"{"id":"L-1"}"#]);
    assert_eq!(id.len(), 36);
    assert_eq!(id.matches('-').count(), 4);
}

#[test]
fn list_shows_added_operation() {
    let env = Env::new();
    let id = env.add(&["leave", "--type", "update", "--payload", r#"{"id":"L-1"}"#]);

    env.cmd()
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("leave"));
}

#[test]
fn list_json_preserves_enqueue_order() {
    let env = Env::new();
    let ids: Vec<_> = ["zz-last-but-first-0", "mm-middle-token-00", "aa-first-but-last-0"]
        .iter()
        .map(|id| env.add(&["leave", "--id", id]))
        .collect();

    let listed: Vec<_> = env
        .list_json()
        .into_iter()
        .map(|op| op["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(listed, ids);
}

#[test]
fn list_json_fields() {
    let env = Env::new();
    env.add(&["leave", "-t", "delete", "-p", r#"{"id":"L-9"}"#, "--id", "delete-leave-nine-0"]);

    let ops = env.list_json();
    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert_eq!(op["id"], "delete-leave-nine-0");
    assert_eq!(op["type"], "delete");
    assert_eq!(op["resource"], "leave");
    assert_eq!(op["payload"]["id"], "L-9");
    assert_eq!(op["retry_count"], 0);
}

#[test]
fn drop_removes_operation() {
    let env = Env::new();
    let id = env.add(&["leave"]);

    env.cmd()
        .args(["queue", "drop", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dropped"));
    assert!(env.list_json().is_empty());
}

#[test]
fn drop_unknown_operation_fails() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "drop", "missing-operation-0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("operation not found"));
}

#[test]
fn add_rejects_short_id() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "add", "leave", "--id", "abc123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid idempotency key"));
}

#[test]
fn add_rejects_hex_only_token() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "add", "leave", "--id", "deadbeefdeadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("looks like hex"));
}

#[test]
fn add_rejects_duplicate_id() {
    let env = Env::new();
    env.add(&["leave", "--id", "same-op-twice-000"]);
    env.cmd()
        .args(["queue", "add", "leave", "--id", "same-op-twice-000"])
        .assert()
        .failure();
    assert_eq!(env.list_json().len(), 1);
}

#[test]
fn add_rejects_invalid_payload() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "add", "leave", "--payload", "{oops"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("json error"));
}

#[test]
fn add_rejects_unknown_type() {
    let env = Env::new();
    env.cmd()
        .args(["queue", "add", "leave", "--type", "upsert"])
        .assert()
        .failure();
}

#[test]
fn missing_config_file_fails() {
    cargo_bin_cmd!("rampart")
        .args(["--config", "/nonexistent/rampart.toml", "queue", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn queue_survives_between_invocations() {
    let env = Env::new();
    let first = env.add(&["leave"]);
    let second = env.add(&["leave"]);
    let ids: Vec<_> = env
        .list_json()
        .into_iter()
        .map(|op| op["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![first, second]);
}
