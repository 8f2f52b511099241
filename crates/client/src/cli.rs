// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rp_core::OpKind;

const QUICKSTART_HELP: &str = "\
Get started:
  rampart queue add leave --payload '{\"id\":\"L-1\"}'   Queue a create
  rampart queue list                                   Show pending operations
  rampart sync                                         Replay them once
  rampart sync --watch                                 Keep syncing while online";

#[derive(Parser, Debug)]
#[command(name = "rampart", version)]
#[command(about = "Offline operation queue that replays mutations against rampartd")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and edit the offline queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Replay queued operations against the server
    Sync {
        /// Keep running: sync periodically and whenever the server comes back
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Queue an operation for later replay
    Add {
        /// Resource the operation targets (endpoint /<resource>/<type>)
        resource: String,

        /// Operation type: create, update or delete
        #[arg(short = 't', long = "type", default_value = "create")]
        kind: OpKind,

        /// JSON payload sent to the server
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Operation id, also the idempotency key (default: a fresh UUID)
        #[arg(long)]
        id: Option<String>,
    },

    /// List pending operations, oldest first
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove an operation without replaying it
    Drop {
        /// Operation id
        id: String,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
