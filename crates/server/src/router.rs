// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint table.
//!
//! Each endpoint names an [`Action`] plus the policy the request pipeline
//! applies before calling it: which rate limit class it counts against,
//! whether it mutates state, and whether an idempotency key is mandatory.

use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rp_core::IdempotencyKey;

use crate::error::{Error, Result};
use crate::idempotency::StoredResponse;
use crate::ratelimit::LimitClass;

/// Input handed to an action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub user_id: String,
    pub endpoint: String,
    pub payload: Value,
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Boxed future returned by [`Action::call`].
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<StoredResponse>> + Send>>;

/// Handler behind an endpoint.
pub trait Action: Send + Sync {
    fn call(&self, ctx: ActionContext) -> ActionFuture;
}

impl<F, Fut> Action for F
where
    F: Fn(ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StoredResponse>> + Send + 'static,
{
    fn call(&self, ctx: ActionContext) -> ActionFuture {
        Box::pin(self(ctx))
    }
}

/// Request policy for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub class: LimitClass,
    /// Mutating endpoints go through the idempotency coordinator when keyed.
    pub mutating: bool,
    /// Reject requests without an idempotency key.
    pub requires_key: bool,
}

impl RoutePolicy {
    pub fn read() -> Self {
        RoutePolicy {
            class: LimitClass::Read,
            mutating: false,
            requires_key: false,
        }
    }

    /// Mutating endpoint that demands a key.
    pub fn write() -> Self {
        RoutePolicy {
            class: LimitClass::Write,
            mutating: true,
            requires_key: true,
        }
    }

    pub fn auth() -> Self {
        RoutePolicy {
            class: LimitClass::Auth,
            mutating: false,
            requires_key: false,
        }
    }

    /// Keep the mutating flag but accept requests without a key.
    pub fn key_optional(mut self) -> Self {
        self.requires_key = false;
        self
    }
}

#[derive(Clone)]
pub struct Route {
    pub policy: RoutePolicy,
    action: Arc<dyn Action>,
}

impl Route {
    pub fn call(&self, ctx: ActionContext) -> ActionFuture {
        self.action.call(ctx)
    }
}

/// Maps endpoint paths to routes.
#[derive(Clone, Default)]
pub struct Router {
    routes: BTreeMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` at `endpoint`.
    ///
    /// Endpoints are absolute paths like `/orders/create` and may only be
    /// registered once.
    pub fn add(
        &mut self,
        endpoint: impl Into<String>,
        policy: RoutePolicy,
        action: impl Action + 'static,
    ) -> Result<&mut Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with('/') || endpoint.len() < 2 {
            return Err(Error::Config(format!(
                "endpoint '{endpoint}' must be an absolute path"
            )));
        }
        if self.routes.contains_key(&endpoint) {
            return Err(Error::Config(format!(
                "endpoint '{endpoint}' registered twice"
            )));
        }
        self.routes.insert(
            endpoint,
            Route {
                policy,
                action: Arc::new(action),
            },
        );
        Ok(self)
    }

    pub fn get(&self, endpoint: &str) -> Result<&Route> {
        self.routes
            .get(endpoint)
            .ok_or_else(|| Error::UnknownEndpoint(endpoint.to_string()))
    }

    /// Registered endpoints in sorted order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
