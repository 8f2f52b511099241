// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

async fn echo(ctx: ActionContext) -> Result<StoredResponse> {
    Ok(StoredResponse::ok(json!({
        "endpoint": ctx.endpoint,
        "user": ctx.user_id,
        "payload": ctx.payload,
    })))
}

fn ctx(endpoint: &str) -> ActionContext {
    ActionContext {
        user_id: "alice".to_string(),
        endpoint: endpoint.to_string(),
        payload: json!({"n": 1}),
        idempotency_key: None,
    }
}

#[tokio::test]
async fn registered_action_is_called() {
    let mut router = Router::new();
    router.add("/orders/create", RoutePolicy::write(), echo).unwrap();

    let route = router.get("/orders/create").unwrap();
    let response = route.call(ctx("/orders/create")).await.unwrap();
    assert_eq!(response.body["user"], "alice");
    assert_eq!(response.body["payload"], json!({"n": 1}));
}

#[test]
fn unknown_endpoint_is_not_found() {
    let router = Router::new();
    let err = router.get("/missing").err().unwrap();
    assert_eq!(err.status(), 404);
}

#[test]
fn duplicate_endpoint_is_rejected() {
    let mut router = Router::new();
    router.add("/a/get", RoutePolicy::read(), echo).unwrap();
    assert!(router.add("/a/get", RoutePolicy::read(), echo).is_err());
    assert_eq!(router.len(), 1);
}

#[parameterized(
    relative = { "orders/create" },
    empty = { "" },
    root = { "/" },
)]
fn malformed_endpoints_are_rejected(endpoint: &str) {
    let mut router = Router::new();
    assert!(router.add(endpoint, RoutePolicy::read(), echo).is_err());
}

#[test]
fn policies_carry_class_and_flags() {
    assert_eq!(RoutePolicy::auth().class, LimitClass::Auth);
    assert!(!RoutePolicy::read().mutating);

    let write = RoutePolicy::write();
    assert!(write.mutating && write.requires_key);

    let optional = RoutePolicy::write().key_optional();
    assert!(optional.mutating && !optional.requires_key);
}

#[test]
fn endpoints_are_listed_sorted() {
    let mut router = Router::new();
    router
        .add("/b/get", RoutePolicy::read(), echo)
        .unwrap()
        .add("/a/get", RoutePolicy::read(), echo)
        .unwrap();
    assert_eq!(router.endpoints().collect::<Vec<_>>(), vec!["/a/get", "/b/get"]);
}
