// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for signed health pushes.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::json;
use tower::ServiceExt;
use wearable_link::db::UserRepository;
use wearable_link::models::User;
use wearable_link::routes::webhook::{sign_payload, SIGNATURE_HEADER};

mod common;

const SECRET: &[u8] = b"test_webhook_secret";

async fn connected_user(app: &common::TestApp, user_id: &str) {
    let mut user = User::new(user_id, "2026-01-01T00:00:00Z");
    user.provider_connected = true;
    app.db.save_user(&user).await.unwrap();
}

async fn push(app: &common::TestApp, body: &[u8], signature: Option<&str>) -> Response {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/health")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }

    app.router
        .clone()
        .oneshot(builder.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap()
}

async fn signed_push(app: &common::TestApp, payload: &serde_json::Value) -> Response {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(SECRET, &body).unwrap();
    push(app, &body, Some(&signature)).await
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_signed_push_is_scored_and_stored() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let response = signed_push(
        &app,
        &json!({ "reference_id": "user-1", "data": common::healthy_bundle() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let ack = json_body(response).await;
    assert_eq!(ack["health_score"], 98);
    assert!(ack["record_id"].as_str().unwrap().starts_with("user-1_"));

    assert_eq!(app.db.health_record_count("user-1"), 1);
    let stats = app
        .db
        .get_user("user-1")
        .await
        .unwrap()
        .unwrap()
        .health_stats
        .unwrap();
    assert_eq!(stats.health_score, 98);
    assert_eq!(stats.last_record_id, ack["record_id"].as_str().unwrap());
    // Pushes never touch the provider
    assert_eq!(app.source.rounds(), 0);
}

#[tokio::test]
async fn test_partial_push_rescales() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let mut bundle = common::healthy_bundle();
    bundle.sleep = None;

    let response = signed_push(&app, &json!({ "reference_id": "user-1", "data": bundle })).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["health_score"], 97);
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let body = serde_json::to_vec(&json!({
        "reference_id": "user-1",
        "data": common::healthy_bundle()
    }))
    .unwrap();
    let response = push(&app, &body, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.db.health_record_count("user-1"), 0);
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let body = serde_json::to_vec(&json!({
        "reference_id": "user-1",
        "data": common::healthy_bundle()
    }))
    .unwrap();

    let wrong_key = sign_payload(b"not_the_secret", &body).unwrap();
    let response = push(&app, &body, Some(&wrong_key)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = push(&app, &body, Some("zz-not-hex")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.db.health_record_count("user-1"), 0);
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let body = serde_json::to_vec(&json!({
        "reference_id": "user-1",
        "data": common::healthy_bundle()
    }))
    .unwrap();
    let signature = sign_payload(SECRET, &body).unwrap();

    let tampered = serde_json::to_vec(&json!({
        "reference_id": "user-2",
        "data": common::healthy_bundle()
    }))
    .unwrap();
    let response = push(&app, &tampered, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_user_not_found() {
    let app = common::create_test_app();

    let response = signed_push(
        &app,
        &json!({ "reference_id": "ghost", "data": common::healthy_bundle() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.db.health_record_count("ghost"), 0);
}

#[tokio::test]
async fn test_disconnected_user_not_found() {
    let app = common::create_test_app();
    let user = User::new("user-1", "2026-01-01T00:00:00Z");
    app.db.save_user(&user).await.unwrap();

    let response = signed_push(
        &app,
        &json!({ "reference_id": "user-1", "data": common::healthy_bundle() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.db.health_record_count("user-1"), 0);
}

#[tokio::test]
async fn test_malformed_payload_rejected() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let body = br#"{"reference_id": 17}"#;
    let signature = sign_payload(SECRET, body).unwrap();
    let response = push(&app, body, Some(&signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_data_rejected() {
    let app = common::create_test_app();
    connected_user(&app, "user-1").await;

    let response = signed_push(&app, &json!({ "reference_id": "user-1", "data": {} })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.db.health_record_count("user-1"), 0);
}
