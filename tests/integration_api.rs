//! API integration tests against the in-memory store

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

mod common;

use common::{create_user, issue_debit_card, send, setup_app, ADMIN_KEY, API_KEY};

#[tokio::test]
async fn test_health_needs_no_api_key() {
    let (app, _) = setup_app();
    let (status, body) = send(&app, "GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_spend_flow_e2e() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "alice").await;
    let card_id = issue_debit_card(&app, user_id).await;
    let limits_uri = format!("/api/v1/cards/{}/limits", card_id);
    let auth_uri = format!("/api/v1/cards/{}/authorizations", card_id);

    // 1. Fresh card starts with the debit defaults
    let (status, json) = send(&app, "GET", &limits_uri, Some(API_KEY), Some(user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remaining_limits"]["atm_withdrawal_daily"], "1000.00");

    // 2. Authorize 400 at the ATM
    let (status, json) = send(
        &app,
        "POST",
        &auth_uri,
        Some(API_KEY),
        Some(user_id),
        Some(json!({ "transaction_type": "atm_withdrawal", "amount": "400" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "authorization failed: {}", json);
    assert_eq!(json["committed"], true);
    assert_eq!(json["evaluation"]["allowed"], true);
    assert_eq!(json["remaining_limits"]["atm_withdrawal_daily"], "600.00");

    // 3. 700 more would exceed the daily limit
    let (status, json) = send(
        &app,
        "POST",
        &auth_uri,
        Some(API_KEY),
        Some(user_id),
        Some(json!({ "transaction_type": "atm_withdrawal", "amount": 700 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "limit_exceeded");

    // 4. Dry run reports without committing
    let (status, json) = send(
        &app,
        "POST",
        &auth_uri,
        Some(API_KEY),
        Some(user_id),
        Some(json!({ "transaction_type": "atm_withdrawal", "amount": "600", "dry_run": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["committed"], false);
    assert_eq!(json["evaluation"]["allowed"], true);
    assert_eq!(json["remaining_limits"]["atm_withdrawal_daily"], "600.00");

    // 5. Raising the limit in the same window keeps usage
    let (status, json) = send(
        &app,
        "POST",
        &limits_uri,
        Some(API_KEY),
        Some(user_id),
        Some(json!({
            "transaction_type": "atm_withdrawal",
            "period": "daily",
            "limit_amount": "2000.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "set limit failed: {}", json);
    assert_eq!(json["remaining_limits"]["atm_withdrawal_daily"], "1600.00");
}

#[tokio::test]
async fn test_frozen_card_rejects_limit_changes() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "bob").await;
    let card_id = issue_debit_card(&app, user_id).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/cards/{}/freeze", card_id),
        Some(API_KEY),
        Some(user_id),
        Some(json!({ "reason": "lost wallet" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["previous_status"], "active");
    assert_eq!(json["status"], "frozen");

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/cards/{}/limits", card_id),
        Some(API_KEY),
        Some(user_id),
        Some(json!({
            "transaction_type": "atm_withdrawal",
            "period": "daily",
            "limit_amount": "50",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "card_not_active");

    // Existing limit untouched
    let (_, json) = send(
        &app,
        "GET",
        &format!("/api/v1/cards/{}/limits", card_id),
        Some(API_KEY),
        Some(user_id),
        None,
    )
    .await;
    assert_eq!(json["remaining_limits"]["atm_withdrawal_daily"], "1000.00");

    // Unfreeze without a body
    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/cards/{}/unfreeze", card_id),
        Some(API_KEY),
        Some(user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "active");
}

#[tokio::test]
async fn test_cancelled_card_cannot_change_status() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "carol").await;
    let card_id = issue_debit_card(&app, user_id).await;
    let card_uri = format!("/api/v1/cards/{}", card_id);

    let (status, json) = send(&app, "DELETE", &card_uri, Some(API_KEY), Some(user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, json) = send(
        &app,
        "POST",
        &format!("{}/freeze", card_uri),
        Some(API_KEY),
        Some(user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_status_transition");
}

#[tokio::test]
async fn test_card_access_errors() {
    let (app, _) = setup_app();
    let owner = create_user(&app, "dave").await;
    let stranger = create_user(&app, "eve").await;
    let card_id = issue_debit_card(&app, owner).await;
    let card_uri = format!("/api/v1/cards/{}", card_id);

    // Not the owner
    let (status, json) = send(&app, "GET", &card_uri, Some(API_KEY), Some(stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error_code"], "unauthorized");

    // Unknown card
    let (status, json) = send(
        &app,
        "GET",
        &format!("/api/v1/cards/{}", Uuid::new_v4()),
        Some(API_KEY),
        Some(owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "card_not_found");

    // No acting user
    let (status, json) = send(&app, "GET", &card_uri, Some(API_KEY), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "missing_header");

    // Owner sees the card
    let (status, json) = send(&app, "GET", &card_uri, Some(API_KEY), Some(owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], card_id.to_string());
    assert_eq!(json["masked_number"].as_str().unwrap().len(), 19);
}

#[tokio::test]
async fn test_validation_errors() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "frank").await;
    let card_id = issue_debit_card(&app, user_id).await;
    let auth_uri = format!("/api/v1/cards/{}/authorizations", card_id);

    for (transaction_type, amount) in [
        ("atm_withdrawal", json!("abc")),
        ("atm_withdrawal", json!("-5")),
        ("atm_withdrawal", json!("0")),
        ("atm_withdrawal", json!("1.005")),
        ("teleport", json!("10")),
    ] {
        let (status, json) = send(
            &app,
            "POST",
            &auth_uri,
            Some(API_KEY),
            Some(user_id),
            Some(json!({ "transaction_type": transaction_type, "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{} {}", transaction_type, amount);
        assert_eq!(json["error_code"], "validation_error");
    }

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/cards/{}/limits", card_id),
        Some(API_KEY),
        Some(user_id),
        Some(json!({
            "transaction_type": "atm_withdrawal",
            "period": "yearly",
            "limit_amount": "100",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_api_key_required() {
    let (app, _) = setup_app();

    let (status, json) = send(&app, "GET", "/api/v1/cards", None, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "missing_api_key");

    let (status, json) = send(&app, "GET", "/api/v1/cards", Some("wrong_key"), Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_api_key");
}

#[tokio::test]
async fn test_list_cards_and_quota() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "grace").await;
    for _ in 0..5 {
        issue_debit_card(&app, user_id).await;
    }

    let (status, json) = send(&app, "GET", "/api/v1/cards", Some(API_KEY), Some(user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 5);

    // The test app allows five cards per user
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/cards",
        Some(API_KEY),
        Some(user_id),
        Some(json!({
            "account_id": Uuid::new_v4(),
            "card_type": "credit",
            "card_network": "mastercard",
            "card_name": "ONE TOO MANY",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "business_rule_violation");

    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/cards?card_type=credit",
        Some(API_KEY),
        Some(user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let (app, _) = setup_app();
    create_user(&app, "heidi").await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/users",
        Some(API_KEY),
        None,
        Some(json!({ "username": "heidi", "email": "other@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_admin_audit_endpoints() {
    let (app, _) = setup_app();
    let user_id = create_user(&app, "ivan").await;
    let card_id = issue_debit_card(&app, user_id).await;
    send(
        &app,
        "POST",
        &format!("/api/v1/cards/{}/authorizations", card_id),
        Some(API_KEY),
        Some(user_id),
        Some(json!({ "transaction_type": "pos_purchase", "amount": "25.50" })),
    )
    .await;

    // Regular key is not an admin
    let (status, _) = send(&app, "GET", "/api/v1/admin/audit", Some(API_KEY), None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&app, "GET", "/api/v1/admin/audit", Some(ADMIN_KEY), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["action"], "card.spend_authorized");

    let (status, json) = send(&app, "GET", "/api/v1/admin/audit/verify", Some(ADMIN_KEY), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_valid"], true);
    assert_eq!(json["entries_checked"], 3);
}
