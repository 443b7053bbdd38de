// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable provider API client and token lifecycle.
//!
//! Handles:
//! - Per-category health data reads
//! - Authorization-code exchange (with PKCE verifier)
//! - Token refresh when expired
//! - Rate limit and credential error detection

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    ActivitySummary, DailySummary, HeartRateSample, SleepSample, StressSample, UserTokens,
};
use crate::services::aggregator::{HealthDataSource, TokenProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// Provider API client.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    api_base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl ProviderClient {
    /// Create a new provider client from the OAuth settings in `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url: config.provider_api_base_url.trim_end_matches('/').to_string(),
            token_url: config.provider_token_url.clone(),
            client_id: config.provider_client_id.clone(),
            client_secret: config.provider_client_secret.clone(),
            redirect_uri: config.provider_redirect_uri.clone(),
        }
    }

    /// Exchange an authorization code for tokens, proving possession of the verifier.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Provider token exchange failed");
            return Err(AppError::UpstreamUnavailable(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse token response: {}", e))
        })
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Token refresh request failed: {}", e))
            })?;

        check_response_json(response).await
    }

    /// GET one category for one day. 404 and 204 mean "no data".
    async fn get_optional<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: &str,
        date: &str,
    ) -> Result<Option<T>, AppError> {
        let url = format!("{}/v1/{}", self.api_base_url, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("date", date)])
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            _ => check_response_json(response).await.map(Some),
        }
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Provider rate limit hit (429)");
            return Err(AppError::UpstreamUnavailable(
                AppError::PROVIDER_RATE_LIMIT.to_string(),
            ));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::UpstreamUnavailable(
                AppError::PROVIDER_TOKEN_ERROR.to_string(),
            ));
        }

        return Err(AppError::UpstreamUnavailable(format!(
            "HTTP {}: {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl HealthDataSource for ProviderClient {
    async fn daily_summary(
        &self,
        access_token: &str,
        date: &str,
    ) -> Result<Option<DailySummary>, AppError> {
        self.get_optional("daily-summary", access_token, date).await
    }

    async fn activities(
        &self,
        access_token: &str,
        date: &str,
    ) -> Result<Option<ActivitySummary>, AppError> {
        self.get_optional("activities", access_token, date).await
    }

    async fn sleep(&self, access_token: &str, date: &str) -> Result<Option<SleepSample>, AppError> {
        self.get_optional("sleep", access_token, date).await
    }

    async fn heart_rate(
        &self,
        access_token: &str,
        date: &str,
    ) -> Result<Option<HeartRateSample>, AppError> {
        self.get_optional("heart-rate", access_token, date).await
    }

    async fn stress(
        &self,
        access_token: &str,
        date: &str,
    ) -> Result<Option<StressSample>, AppError> {
        self.get_optional("stress", access_token, date).await
    }
}

/// Token endpoint response, for both code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Some providers omit the refresh token on refresh; the old one stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Space-separated granted scopes, when the provider reports them
    #[serde(default)]
    pub scope: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ProviderService - token management on top of the client
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::SharedRepository;
use crate::services::kms::{token_aad, KmsService};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type.
pub type TokenCache = Arc<DashMap<String, CachedToken>>;

/// Shared refresh locks type.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Decrypted provider tokens. Only ever held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
    pub scopes: Vec<String>,
}

/// Provider service that owns the token lifecycle.
///
/// Caches access tokens in memory and serializes refreshes per user, so
/// concurrent syncs and the callback never race each other into the token
/// endpoint. Tokens are KMS-encrypted at rest, bound to their user.
#[derive(Clone)]
pub struct ProviderService {
    client: ProviderClient,
    db: SharedRepository,
    kms: KmsService,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
    scopes: Vec<String>,
}

impl ProviderService {
    pub fn new(
        client: ProviderClient,
        db: SharedRepository,
        kms: KmsService,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client,
            db,
            kms,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            scopes,
        }
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    // ─── Token Storage ───────────────────────────────────────────────────────

    /// Encrypt and store a user's tokens.
    pub async fn store_tokens(&self, user_id: &str, tokens: &ProviderTokens) -> Result<(), AppError> {
        let aad = token_aad(user_id);
        let stored = UserTokens {
            access_token_encrypted: self.kms.encrypt(&tokens.access_token, &aad).await?,
            refresh_token_encrypted: self.kms.encrypt(&tokens.refresh_token, &aad).await?,
            expires_at: tokens.expires_at.clone(),
            scopes: tokens.scopes.clone(),
        };
        self.db.set_tokens(user_id, &stored).await
    }

    /// Load and decrypt a user's stored tokens.
    pub async fn load_tokens(&self, user_id: &str) -> Result<Option<ProviderTokens>, AppError> {
        let Some(stored) = self.db.get_tokens(user_id).await? else {
            return Ok(None);
        };
        let access_token = self.open(user_id, &stored.access_token_encrypted).await?;
        let refresh_token = self.open(user_id, &stored.refresh_token_encrypted).await?;
        Ok(Some(ProviderTokens {
            access_token,
            refresh_token,
            expires_at: stored.expires_at,
            scopes: stored.scopes,
        }))
    }

    /// Decrypt one stored token. A ciphertext that will not open means the
    /// user has to reconnect.
    async fn open(&self, user_id: &str, ciphertext: &str) -> Result<String, AppError> {
        self.kms
            .decrypt(ciphertext, &token_aad(user_id))
            .await
            .map_err(|e| {
                tracing::warn!(user_id, error = %e, "Stored token failed to decrypt");
                AppError::TokenUnavailable(format!("stored token unreadable for {}", user_id))
            })
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// 1. Check the in-memory cache
    /// 2. Take the per-user refresh lock and re-check
    /// 3. Load stored tokens and decrypt only the access token
    /// 4. Use it if still valid
    /// 5. Otherwise decrypt the refresh token, refresh with the provider and
    ///    store the result
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(cached) = self.token_cache.get(user_id) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let lock = self
            .refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(cached) = self.token_cache.get(user_id) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let stored = self
            .db
            .get_tokens(user_id)
            .await?
            .ok_or_else(|| AppError::TokenUnavailable(format!("no tokens for {}", user_id)))?;

        let access_token = self.open(user_id, &stored.access_token_encrypted).await?;

        let expires_at = DateTime::parse_from_rfc3339(&stored.expires_at)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
            .with_timezone(&Utc);

        if now + margin < expires_at {
            self.cache(user_id, &access_token, expires_at);
            return Ok(access_token);
        }

        tracing::info!(user_id, "Access token expired, refreshing");

        let previous = ProviderTokens {
            access_token,
            refresh_token: self.open(user_id, &stored.refresh_token_encrypted).await?,
            expires_at: stored.expires_at,
            scopes: stored.scopes,
        };

        let refreshed = match self.client.refresh_token(&previous.refresh_token).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token refresh failed");
                return Err(AppError::TokenUnavailable(e.to_string()));
            }
        };

        let updated = self.tokens_from_response(refreshed, Some(&previous));
        self.store_tokens(user_id, &updated).await?;
        self.cache(user_id, &updated.access_token, parse_expiry(&updated.expires_at));

        tracing::info!(user_id, "Token refreshed and cached");
        Ok(updated.access_token)
    }

    fn cache(&self, user_id: &str, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            user_id.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    fn tokens_from_response(
        &self,
        response: TokenResponse,
        previous: Option<&ProviderTokens>,
    ) -> ProviderTokens {
        let expires_at = Utc::now() + Duration::seconds(response.expires_in);
        let refresh_token = response
            .refresh_token
            .or_else(|| previous.map(|p| p.refresh_token.clone()))
            .unwrap_or_default();
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => previous
                .map(|p| p.scopes.clone())
                .unwrap_or_else(|| self.scopes.clone()),
        };

        ProviderTokens {
            access_token: response.access_token,
            refresh_token,
            expires_at: crate::time_utils::format_utc_rfc3339(expires_at),
            scopes,
        }
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Exchange the callback code, store tokens and mark the user connected.
    pub async fn handle_oauth_callback(
        &self,
        user_id: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<(), AppError> {
        let token_response = self.client.exchange_code(code, code_verifier).await?;
        let tokens = self.tokens_from_response(token_response, None);

        self.store_tokens(user_id, &tokens).await?;
        self.cache(user_id, &tokens.access_token, parse_expiry(&tokens.expires_at));

        let now = crate::time_utils::format_utc_rfc3339(Utc::now());
        self.db.set_provider_connection(user_id, Some(&now)).await?;

        tracing::info!(user_id, "OAuth callback handled, tokens stored");
        Ok(())
    }

    /// Drop stored and cached tokens and mark the user disconnected.
    pub async fn revoke_local_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.token_cache.remove(user_id);
        self.db.delete_tokens(user_id).await?;
        self.db.set_provider_connection(user_id, None).await?;

        tracing::info!(user_id, "Provider tokens revoked locally");
        Ok(())
    }
}

fn parse_expiry(expires_at: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(expires_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl TokenProvider for ProviderService {
    async fn access_token(&self, user_id: &str) -> Result<String, AppError> {
        self.get_valid_access_token(user_id).await
    }
}
