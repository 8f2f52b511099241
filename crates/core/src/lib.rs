// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rp-core: Shared primitives for the rampart resilience core
//!
//! This crate provides the pieces used by both the `rampartd` server and the
//! `rampart` offline client: the clock abstraction, the in-process TTL cache,
//! idempotency key validation, the queued operation model and the WebSocket
//! wire protocol.

pub mod cache;
pub mod clock;
pub mod error;
pub mod key;
pub mod op;
pub mod protocol;

pub use cache::{CacheEntry, TtlCache};
pub use clock::{ClockSource, ManualClock, SharedClock, SystemClock};
pub use error::{Error, Result};
pub use key::IdempotencyKey;
pub use op::{OpKind, OpUpdate, SyncOperation};
