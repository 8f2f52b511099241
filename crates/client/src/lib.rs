// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rprs: the rampart offline client.
//!
//! Mutations made while the server is unreachable are stored in a local
//! SQLite queue and replayed later, each under its own idempotency key, so a
//! replay that already reached the server is never applied twice.
//!
//! # Main Components
//!
//! - [`sync::OfflineQueue`] - durable queue of pending operations, oldest first
//! - [`sync::SyncManager`] - drains the queue through per-resource handlers
//! - [`sync::RemoteHandler`] - replays an operation over the WebSocket protocol
//! - [`ClientConfig`] - server URL, queue location and retry tuning
//!
//! ```rust,ignore
//! let queue = Arc::new(OfflineQueue::open(&config.queue_path())?);
//! let manager = SyncManager::new(Arc::clone(&queue), &config);
//! manager.register_handler("leave", RemoteHandler::new(WebSocketTransport::new(), &config));
//! manager.sync().await?;
//! ```

mod cli;
mod commands;

pub mod config;
pub mod error;
pub mod sync;

pub use cli::{Cli, Command, QueueCommand};
pub use config::ClientConfig;
pub use error::{Error, Result};

/// Runs a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::resolve(cli.config.as_deref())?;
    match cli.command {
        Command::Queue { command } => match command {
            QueueCommand::Add {
                resource,
                kind,
                payload,
                id,
            } => commands::queue::add(&config, &resource, kind, &payload, id),
            QueueCommand::List { json } => commands::queue::list(&config, json),
            QueueCommand::Drop { id } => commands::queue::remove(&config, &id),
        },
        Command::Sync { watch } => commands::sync::run(&config, watch).await,
    }
}
