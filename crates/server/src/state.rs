// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared server state.
//!
//! Everything a connection needs, constructed once at startup and handed
//! to each connection task by cloning the handle.

use std::sync::Arc;

use rp_core::SharedClock;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::idempotency::{IdempotencyCoordinator, SqliteIdempotencyStore};
use crate::ratelimit::RateLimiter;
use crate::records::{self, RecordStore};
use crate::router::Router;

/// Handle to the server's services.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    config: ServerConfig,
    clock: SharedClock,
    limiter: RateLimiter,
    coordinator: IdempotencyCoordinator<SqliteIdempotencyStore>,
    records: Arc<RecordStore>,
    router: Router,
}

impl ServerState {
    /// Assembles state from already-open stores.
    ///
    /// `router` may carry extra endpoints; the record endpoints for each
    /// configured resource are added to it.
    pub fn new(
        config: ServerConfig,
        clock: SharedClock,
        store: Arc<SqliteIdempotencyStore>,
        records: Arc<RecordStore>,
        mut router: Router,
    ) -> Result<Self> {
        config.validate()?;
        records::register_routes(&mut router, &records, &config.resources)?;

        let coordinator = IdempotencyCoordinator::new(
            store,
            Arc::clone(&clock),
            config.idempotency.coordinator(),
        );

        Ok(ServerState {
            inner: Arc::new(ServerStateInner {
                limiter: RateLimiter::new(Arc::clone(&clock)),
                coordinator,
                records,
                router,
                clock,
                config,
            }),
        })
    }

    /// Opens the SQLite files under the configured data directory.
    pub fn open(config: ServerConfig, clock: SharedClock) -> Result<Self> {
        let store = SqliteIdempotencyStore::open(&config.idempotency_db_path())?;
        let records =
            RecordStore::open(&config.records_db_path(), Arc::clone(&clock), config.stats_ttl())?;
        Self::new(config, clock, Arc::new(store), Arc::new(records), Router::new())
    }

    /// State backed by in-memory databases.
    pub fn in_memory(config: ServerConfig, clock: SharedClock, router: Router) -> Result<Self> {
        let store = SqliteIdempotencyStore::open_in_memory()?;
        let records = RecordStore::open_in_memory(Arc::clone(&clock), config.stats_ttl())?;
        Self::new(config, clock, Arc::new(store), Arc::new(records), router)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn coordinator(&self) -> &IdempotencyCoordinator<SqliteIdempotencyStore> {
        &self.inner.coordinator
    }

    pub fn records(&self) -> &RecordStore {
        &self.inner.records
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }
}
