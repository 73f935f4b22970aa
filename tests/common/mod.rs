//! Common test utilities

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use cardlimits::api::middleware::ApiKeyRegistry;
use cardlimits::audit::sha256_hex;
use cardlimits::config::ApiKeyConfig;
use cardlimits::{build_router, AppState};
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const API_KEY: &str = "test_key_123";
pub const ADMIN_KEY: &str = "admin_key_456";

fn key(name: &str, raw: &str, permissions: &[&str]) -> ApiKeyConfig {
    ApiKeyConfig {
        name: name.to_string(),
        key_hash: sha256_hex(raw),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

/// In-memory app with one regular and one admin key
pub fn setup_app() -> (Router, AppState) {
    let registry = ApiKeyRegistry::from_config(&[
        key("Test Key", API_KEY, &["read", "write"]),
        key("Admin Key", ADMIN_KEY, &["admin"]),
    ]);
    let state = AppState::in_memory(registry, 5);
    (build_router(state.clone()), state)
}

/// Send a request and decode the JSON body (Null when empty)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    user_id: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    if let Some(user_id) = user_id {
        builder = builder.header("X-Request-User-Id", user_id.to_string());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

/// Register a user and return its id
pub async fn create_user(app: &Router, username: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    let (status, _) = send(
        app,
        "POST",
        "/api/v1/users",
        Some(API_KEY),
        None,
        Some(serde_json::json!({
            "user_id": user_id,
            "username": username,
            "email": format!("{}@example.com", username),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "user creation failed");
    user_id
}

/// Issue a debit card for `user_id` and return its id
pub async fn issue_debit_card(app: &Router, user_id: Uuid) -> Uuid {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/cards",
        Some(API_KEY),
        Some(user_id),
        Some(serde_json::json!({
            "account_id": Uuid::new_v4(),
            "card_type": "debit",
            "card_network": "visa",
            "card_name": "TEST HOLDER",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "card issue failed: {}", json);
    json["card"]["id"].as_str().unwrap().parse().unwrap()
}
