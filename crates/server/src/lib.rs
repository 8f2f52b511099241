// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rpserver: the rampartd request pipeline.
//!
//! Requests arrive as JSON over WebSocket, are counted against a per-class
//! fixed-window rate limit, and mutating requests carrying an idempotency
//! key run at most once per `(key, user, endpoint)` through a SQLite-backed
//! coordinator that several server processes can share.

pub mod config;
pub mod error;
pub mod idempotency;
pub mod ratelimit;
pub mod records;
pub mod router;
pub mod server;
pub mod state;
pub mod sweep;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use idempotency::{IdempotencyCoordinator, Outcome, SqliteIdempotencyStore, StoredResponse};
pub use ratelimit::{Decision, LimitClass, RateLimitConfig, RateLimiter, RateLimits};
pub use router::{Action, ActionContext, RoutePolicy, Router};
pub use state::ServerState;
