// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for provider-pushed health data.
//!
//! Payloads are signed with HMAC-SHA256 over the raw body using the shared
//! webhook secret; the hex signature arrives in `X-Webhook-Signature`.

use crate::error::{AppError, Result};
use crate::models::HealthSampleBundle;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded payload signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/health", post(handle_health_push))
}

/// Provider push payload.
#[derive(Deserialize, Debug)]
struct HealthPush {
    /// Our user ID, registered with the provider at connection time
    reference_id: String,
    data: HealthSampleBundle,
}

#[derive(Serialize)]
struct WebhookAck {
    record_id: String,
    health_score: u8,
}

/// Handle a pushed health payload (POST).
async fn handle_health_push(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !verify_signature(&state.config.webhook_secret, &body, signature) {
        tracing::warn!("Security Alert: webhook signature mismatch");
        return Err(AppError::Unauthorized);
    }

    let push: HealthPush = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {}", e)))?;

    let user = state
        .db
        .get_user(&push.reference_id)
        .await?
        .filter(|u| u.provider_connected)
        .ok_or_else(|| AppError::NotFound(format!("connected user {}", push.reference_id)))?;

    tracing::info!(
        user_id = %user.user_id,
        missing = push.data.missing_categories().len(),
        "Webhook health payload received"
    );

    let summary = state.aggregator.ingest(&user.user_id, &push.data).await?;

    Ok(Json(WebhookAck {
        record_id: summary.record_id,
        health_score: summary.health_score,
    }))
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Option<String> {
    compute_signature(secret, body).map(hex::encode)
}

fn compute_signature(secret: &[u8], body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Constant-time comparison of the expected and provided signatures.
fn verify_signature(secret: &[u8], body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let Some(expected) = compute_signature(secret, body) else {
        return false;
    };

    expected.as_slice().ct_eq(provided.as_slice()).into()
}
