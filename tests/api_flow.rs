// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end flows through the HTTP router.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use cleanslate_server::{
    api,
    auth::AuthConfig,
    ledger::LedgerPolicy,
    state::AppState,
    storage::{StoragePaths, Store},
};

const PASSWORD: &str = "correct horse battery";

fn app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::new(dir.path());
    let store = Store::open(&paths.database()).unwrap();
    let auth = AuthConfig::new(b"integration-secret-at-least-32-bytes", "test")
        .with_password_iterations(1_000);
    let state = AppState::new(store, paths, auth, LedgerPolicy::default());
    (api::router(state, &[]), dir)
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn sign_up(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/auth/users/",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/auth/token/login/",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["auth_token"].as_str().unwrap().to_string()
}

async fn list_for_credits(app: &Router, token: &str, title: &str, credits: i64) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/listings",
        Some(token),
        Some(json!({
            "title": title,
            "price": "150.00",
            "condition": "good",
            "is_redeemable_with_green_credits": true,
            "green_credit_price": credits,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn registration_grants_free_wipes_and_credits() {
    let (app, _dir) = app();
    let token = sign_up(&app, "Alice@Example.com").await;

    let (status, me) = send(&app, Method::GET, "/auth/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["wipes_remaining"], 3);
    assert_eq!(me["green_credits"], 30);
}

#[tokio::test]
async fn redeem_listing_then_run_out_of_credits() {
    let (app, _dir) = app();
    let seller = sign_up(&app, "seller@example.com").await;
    let buyer = sign_up(&app, "buyer@example.com").await;

    let laptop = list_for_credits(&app, &seller, "Laptop", 25).await;
    let tablet = list_for_credits(&app, &seller, "Tablet", 25).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{laptop}/redeem"),
        Some(&buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 5);
    assert_eq!(body["listing"]["status"], "sold");
    assert_eq!(body["transaction"]["amount"], -25);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/listings/{tablet}/redeem"),
        Some(&buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "insufficient_credits");

    // A failed redemption leaves the listing for sale
    let (_, body) = send(&app, Method::GET, &format!("/api/listings/{tablet}"), None, None).await;
    assert_eq!(body["status"], "active");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/green-credit-transactions",
        Some(&buyer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn clients_cannot_reach_staff_endpoints() {
    let (app, _dir) = app();
    let token = sign_up(&app, "alice@example.com").await;

    let (status, _) = send(&app, Method::GET, "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/categories",
        Some(&token),
        Some(json!({ "name": "Phones" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (app, _dir) = app();
    sign_up(&app, "alice@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/token/login/",
        None,
        Some(json!({ "email": "alice@example.com", "password": "not the password" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_credentials");
}
