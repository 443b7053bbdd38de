// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{HealthRecord, HealthStats};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_LOOKBACK_DAYS: u32 = 7;
const MAX_LOOKBACK_DAYS: u32 = 90;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health/recent", get(get_recent_records))
        .route("/api/health/stats", get(get_health_stats))
        .route("/api/connection", delete(disconnect))
}

// ─── Health Records ──────────────────────────────────────────

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default)]
    days: Option<u32>,
}

/// Recent health records response.
#[derive(Serialize)]
pub struct RecentRecordsResponse {
    pub days: u32,
    pub records: Vec<HealthRecord>,
}

/// Get the user's health records from the last `days` days, newest first.
async fn get_recent_records(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentRecordsResponse>> {
    let days = query.days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
    if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_LOOKBACK_DAYS
        )));
    }

    let records = state
        .db
        .find_recent_health_records(&user.user_id, days)
        .await?;

    Ok(Json(RecentRecordsResponse { days, records }))
}

// ─── Rolling Stats ───────────────────────────────────────────

/// Health stats response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthStatsResponse {
    pub provider_connected: bool,
    pub sync_active: bool,
    pub stats: HealthStats,
}

/// Get the user's rolling health stats. Users without data get the defaults.
async fn get_health_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<HealthStatsResponse>> {
    let profile = state.db.get_user(&user.user_id).await?;

    let (provider_connected, stats) = match profile {
        Some(p) => (p.provider_connected, p.health_stats.unwrap_or_default()),
        None => (false, HealthStats::default()),
    };

    Ok(Json(HealthStatsResponse {
        provider_connected,
        sync_active: state.scheduler.is_active(&user.user_id),
        stats,
    }))
}

// ─── Disconnect ──────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DisconnectResponse {
    pub success: bool,
    pub was_syncing: bool,
}

/// Unlink the provider: stop syncing, drop tokens, mark disconnected.
///
/// Existing health records are kept.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    tracing::info!(user_id = %user.user_id, "User-initiated provider disconnect");

    let was_syncing = state.scheduler.stop(&user.user_id).await;
    state.provider.revoke_local_tokens(&user.user_id).await?;

    Ok(Json(DisconnectResponse {
        success: true,
        was_syncing,
    }))
}
