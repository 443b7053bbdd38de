// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider connection routes (OAuth 2.0 authorization code + PKCE).

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::pkce;
use crate::AppState;

/// Entropy of the request ID used to correlate logs across the redirect.
const REQUEST_ID_BYTES: usize = 16;

/// Callback route (public: the provider redirects the browser here).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/provider/callback", get(auth_callback))
}

/// Connect route (requires an authenticated session).
/// The auth middleware is applied in routes/mod.rs.
pub fn connect_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/connect", get(connect_start))
}

/// Start the connection - redirect to the provider's authorization page.
async fn connect_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Redirect> {
    let pair = pkce::generate_pair()?;
    let oauth_state = pkce::generate_state(pkce::DEFAULT_STATE_BYTES)?;
    let request_id = pkce::generate_state(REQUEST_ID_BYTES)?;

    state
        .auth_store
        .begin(&oauth_state, &pair.code_verifier, &request_id, &user.user_id);

    let config = &state.config;
    let auth_url = format!(
        "{}?response_type=code&\
         client_id={}&\
         redirect_uri={}&\
         scope={}&\
         state={}&\
         code_challenge={}&\
         code_challenge_method={}",
        config.provider_authorize_url,
        urlencoding::encode(&config.provider_client_id),
        urlencoding::encode(&config.provider_redirect_uri),
        urlencoding::encode(&config.provider_scopes.join(" ")),
        oauth_state,
        pair.code_challenge,
        pair.method,
    );

    tracing::info!(
        user_id = %user.user_id,
        request_id = %request_id,
        "Starting provider connection, redirecting to provider"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - redeem the transaction, exchange the code and arm syncing.
///
/// Every failure lands on the same generic frontend error so the browser
/// learns nothing about which check failed.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let frontend_url = &state.config.frontend_url;

    match complete_connection(&state, params).await {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, "Provider connected");
            Redirect::temporary(&format!("{}?connected=true", frontend_url))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Provider connection failed");
            Redirect::temporary(&format!("{}?error=connection_failed", frontend_url))
        }
    }
}

async fn complete_connection(state: &AppState, params: CallbackParams) -> Result<String> {
    if let Some(error) = params.error {
        // Consume the transaction so the state cannot be retried.
        if let Some(oauth_state) = params.state.as_deref() {
            let _ = state.auth_store.redeem(oauth_state);
        }
        return Err(AppError::BadRequest(format!(
            "provider returned error: {}",
            error
        )));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest(
            "callback missing code or state".to_string(),
        ));
    };

    let transaction = state.auth_store.redeem(&oauth_state)?;

    if !state.auth_store.mark_code_used(&code) {
        tracing::warn!(
            request_id = %transaction.request_id,
            "Security Alert: authorization code replayed"
        );
        return Err(AppError::BadRequest(
            "authorization code already used".to_string(),
        ));
    }

    tracing::info!(
        request_id = %transaction.request_id,
        user_id = %transaction.user_id,
        "Exchanging authorization code for tokens"
    );

    state
        .provider
        .handle_oauth_callback(&transaction.user_id, &code, &transaction.code_verifier)
        .await?;

    // The link is established even if the first sync fails; the schedule retries.
    if let Err(e) = state
        .scheduler
        .start(
            &transaction.user_id,
            state.provider.clone(),
            state.config.sync_interval(),
        )
        .await
    {
        tracing::warn!(
            user_id = %transaction.user_id,
            error = %e,
            "Initial sync after connection failed"
        );
    }

    Ok(transaction.user_id)
}
