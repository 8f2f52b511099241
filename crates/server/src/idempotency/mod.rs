// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! At-most-once execution of mutating requests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  execute(key, user, endpoint, op)  ┌──────────────────┐
//! │   Request    │───────────────────────────────────►│   Coordinator    │
//! │   handler    │◄───────────── Outcome ─────────────│ (claim / replay) │
//! └──────────────┘                                    └────────┬─────────┘
//!                                                              │
//!                                                              ▼
//!                                                     ┌──────────────────┐
//!                                                     │ IdempotencyStore │  UNIQUE(key, user, endpoint)
//!                                                     │    (SQLite)      │
//!                                                     └──────────────────┘
//! ```
//!
//! The store's uniqueness constraint is the only arbiter of which attempt
//! runs. Server instances sharing one database file coordinate through it
//! without any in-process locking.

mod coordinator;
mod store;

pub use coordinator::{CoordinatorConfig, IdempotencyCoordinator, Outcome};
pub use store::{
    ClaimToken, IdempotencyRecord, IdempotencyStore, InsertOutcome, RecordState, Scope,
    SqliteIdempotencyStore, StoreError, StoreResult, StoredResponse,
};
