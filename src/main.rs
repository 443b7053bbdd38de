// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable Link API Server
//!
//! Links user accounts to a wearable health provider and keeps their health
//! records synchronized and scored.

use futures_util::StreamExt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wearable_link::{
    config::Config,
    db::{FirestoreDb, SharedRepository},
    services::{KmsService, ProviderClient},
    AppState,
};

/// Users re-armed concurrently at startup.
const REARM_CONCURRENCY: usize = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Wearable Link API");

    // Initialize Firestore database
    let db: SharedRepository = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.kms_location,
        &config.kms_key_ring,
        &config.kms_key_name,
    )
    .await?;

    let source = Arc::new(ProviderClient::new(&config));
    let state = Arc::new(AppState::new(config.clone(), db, kms, source));

    let reaper = state
        .auth_store
        .spawn_reaper(config.auth_reaper_period());
    tracing::info!(
        period_secs = config.auth_reaper_period().as_secs(),
        "Authorization store reaper started"
    );

    // Build router
    let app = wearable_link::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    // Initial syncs can take a while per user; serve requests meanwhile
    tokio::spawn(rearm_connected_users(state.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.shutdown();
    reaper.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Schedules live in memory only; restore them for users still connected.
async fn rearm_connected_users(state: Arc<AppState>) {
    let users = match state.db.list_connected_users().await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list connected users, no schedules re-armed");
            return;
        }
    };

    let total = users.len();
    let state = &state;
    futures_util::stream::iter(users)
        .for_each_concurrent(REARM_CONCURRENCY, |user| async move {
            if let Err(e) = state
                .scheduler
                .start(
                    &user.user_id,
                    state.provider.clone(),
                    state.config.sync_interval(),
                )
                .await
            {
                tracing::warn!(
                    user_id = %user.user_id,
                    error = %e,
                    "Initial sync after restart failed, schedule kept"
                );
            }
        })
        .await;

    tracing::info!(
        users = total,
        active = state.scheduler.active_count(),
        "Sync schedules re-armed"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(
                    "wearable_link=debug"
                        .parse()
                        .expect("static log directive is valid"),
                )
                .add_directive("info".parse().expect("static log directive is valid")),
        )
        .with(format)
        .init();
}
