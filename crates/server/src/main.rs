// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rampartd: WebSocket server with idempotent mutations and rate limiting.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rp_core::SystemClock;
use rpserver::{server, ServerConfig, ServerState};

/// rampartd: idempotent request server
#[derive(Parser, Debug)]
#[command(name = "rampartd", version)]
#[command(about = "WebSocket server with idempotent mutations and per-class rate limits")]
struct Args {
    /// Configuration file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the server to (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Directory for the SQLite files (overrides the config file)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> rpserver::Result<()> {
    let mut config = ServerConfig::resolve(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(data) = args.data {
        config.data_dir = Some(data);
    }

    info!("Starting rampartd");
    info!("  Bind address: {}", config.bind);
    info!("  Data directory: {}", config.data_dir().display());
    info!("  Resources: {}", config.resources.join(", "));

    let state = ServerState::open(config, SystemClock::shared())?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Cannot listen for interrupts: {}", e),
        }
    });

    server::run(state, cancel).await
}
