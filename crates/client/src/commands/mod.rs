// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod queue;
pub mod sync;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::sync::OfflineQueue;

/// Opens the queue file named by `config`, creating it if needed.
fn open_queue(config: &ClientConfig) -> Result<OfflineQueue> {
    Ok(OfflineQueue::open(&config.queue_path())?)
}
