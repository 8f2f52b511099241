// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The `sync` command.
//!
//! Holds an exclusive lock next to the queue file for its whole run, so two
//! processes never replay the same queue at once. A one-shot sync only
//! replays after the server answers a ping; while it is unreachable the
//! queue is left untouched.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::open_queue;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::sync::{RemoteHandler, SyncEvent, SyncManager, SyncReport, SyncRun, WebSocketTransport};

/// Upper bound on the interval between connectivity probes in watch mode.
const MAX_PROBE_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(config: &ClientConfig, watch: bool) -> Result<()> {
    let _lock = acquire_lock(&config.lock_path())?;
    let queue = Arc::new(open_queue(config)?);
    let manager = Arc::new(SyncManager::new(Arc::clone(&queue), config));
    let remote = RemoteHandler::new(WebSocketTransport::new(), config);

    let mut resources: BTreeSet<String> = config.resources.iter().cloned().collect();
    resources.extend(queue.resources()?);
    for resource in resources {
        manager.register_handler(resource, remote.clone());
    }

    let (_, mut events) = manager.subscribe();
    if watch {
        let printer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event);
            }
        });
        let result = watch_loop(Arc::clone(&manager), remote).await;
        printer.abort();
        return result;
    }

    if let Err(e) = remote.ping().await {
        info!("Server unreachable: {}", e);
        remote.disconnect().await;
        println!("{}", format_offline(queue.count()?));
        return Ok(());
    }

    manager.set_online(true);
    let run = manager.sync().await;
    print_pending_events(&mut events);
    remote.disconnect().await;
    match run? {
        SyncRun::Completed(report) => println!("{}", format_report(&report)),
        SyncRun::AlreadyRunning => println!("Sync already running"),
    }
    Ok(())
}

/// Syncs until interrupted, probing the server to drive online state.
async fn watch_loop(
    manager: Arc<SyncManager>,
    remote: RemoteHandler<WebSocketTransport>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let (online_tx, online_rx) = watch::channel(false);
    let probe_interval = manager.interval().min(MAX_PROBE_INTERVAL);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, stopping");
                shutdown.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupts: {}", e),
        }
    });

    let probe_cancel = cancel.clone();
    let probe = tokio::spawn(async move {
        loop {
            let online = remote.ping().await.is_ok();
            online_tx.send_if_modified(|current| {
                let changed = *current != online;
                *current = online;
                changed
            });
            debug!(online, "connectivity probe");
            tokio::select! {
                _ = probe_cancel.cancelled() => break,
                _ = tokio::time::sleep(probe_interval) => {}
            }
        }
        remote.disconnect().await;
    });

    manager.run(online_rx, cancel.clone()).await;
    cancel.cancel();
    let _ = probe.await;
    Ok(())
}

/// Takes the exclusive lock at `path`, failing if another process holds it.
fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| Error::SyncLocked(path.display().to_string()))?;
    Ok(file)
}

fn print_pending_events(events: &mut mpsc::UnboundedReceiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

fn print_event(event: &SyncEvent) {
    if let SyncEvent::Dropped {
        id,
        resource,
        error,
    } = event
    {
        eprintln!("dropped {} ({}): {}", id, resource, error);
    }
}

fn format_offline(pending: usize) -> String {
    format!("Offline: server unreachable, {} operation(s) left queued", pending)
}

fn format_report(report: &SyncReport) -> String {
    if report.attempted == 0 {
        return "Nothing to sync".to_string();
    }
    format!(
        "Synced {} of {} operation(s): {} retried, {} dropped, {} remaining",
        report.succeeded, report.attempted, report.retried, report.dropped, report.remaining
    )
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
