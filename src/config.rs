// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment and read
//! once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default interval between provider syncs for a connected user.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 60;
/// Default lifetime of a pending authorization transaction.
pub const DEFAULT_AUTH_TRANSACTION_TTL_MINUTES: u64 = 10;
/// Default period of the authorization-transaction reaper.
pub const DEFAULT_AUTH_REAPER_PERIOD_MINUTES: u64 = 5;
/// Default size above which the used-code set is cleared.
pub const DEFAULT_USED_CODE_CEILING: usize = 1000;
/// Default per-category fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_KMS_LOCATION: &str = "us-west1";
pub const DEFAULT_KMS_KEY_RING: &str = "wearable-link";
pub const DEFAULT_KMS_KEY_NAME: &str = "token-encryption";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Provider OAuth ---
    /// Provider OAuth client ID (public)
    pub provider_client_id: String,
    /// Provider OAuth client secret
    pub provider_client_secret: String,
    /// Callback URL registered with the provider
    pub provider_redirect_uri: String,
    /// Requested OAuth scopes
    pub provider_scopes: Vec<String>,
    /// Provider authorization endpoint
    pub provider_authorize_url: String,
    /// Provider token endpoint
    pub provider_token_url: String,
    /// Base URL of the provider's health data API
    pub provider_api_base_url: String,

    // --- Sync and transaction tuning ---
    pub sync_interval_minutes: u64,
    pub auth_transaction_ttl_minutes: u64,
    pub auth_reaper_period_minutes: u64,
    pub used_code_ceiling: usize,
    pub fetch_timeout_secs: u64,

    // --- Service ---
    /// Frontend URL for post-connection redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore, KMS)
    pub gcp_project_id: String,
    /// KMS location of the token-encryption key ring
    pub kms_location: String,
    pub kms_key_ring: String,
    pub kms_key_name: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Shared secret used to sign webhook payloads
    pub webhook_secret: Vec<u8>,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            provider_client_id: "test_client_id".to_string(),
            provider_client_secret: "test_secret".to_string(),
            provider_redirect_uri: "http://localhost:8080/auth/provider/callback".to_string(),
            provider_scopes: vec![
                "activity".to_string(),
                "sleep".to_string(),
                "heartrate".to_string(),
            ],
            provider_authorize_url: "https://provider.example.com/oauth/authorize".to_string(),
            provider_token_url: "https://provider.example.com/oauth/token".to_string(),
            provider_api_base_url: "https://api.provider.example.com".to_string(),
            sync_interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            auth_transaction_ttl_minutes: DEFAULT_AUTH_TRANSACTION_TTL_MINUTES,
            auth_reaper_period_minutes: DEFAULT_AUTH_REAPER_PERIOD_MINUTES,
            used_code_ceiling: DEFAULT_USED_CODE_CEILING,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            kms_location: DEFAULT_KMS_LOCATION.to_string(),
            kms_key_ring: DEFAULT_KMS_KEY_RING.to_string(),
            kms_key_name: DEFAULT_KMS_KEY_NAME.to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            webhook_secret: b"test_webhook_secret".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            provider_client_id: required("PROVIDER_CLIENT_ID")?,
            provider_client_secret: required("PROVIDER_CLIENT_SECRET")?,
            provider_redirect_uri: required("PROVIDER_REDIRECT_URI")?,
            provider_scopes: parse_scopes(
                &env::var("PROVIDER_SCOPES")
                    .unwrap_or_else(|_| "activity,sleep,heartrate,stress".to_string()),
            ),
            provider_authorize_url: required("PROVIDER_AUTHORIZE_URL")?,
            provider_token_url: required("PROVIDER_TOKEN_URL")?,
            provider_api_base_url: required("PROVIDER_API_BASE_URL")?,

            sync_interval_minutes: parsed("SYNC_INTERVAL_MINUTES", DEFAULT_SYNC_INTERVAL_MINUTES)?,
            auth_transaction_ttl_minutes: parsed(
                "AUTH_TRANSACTION_TTL_MINUTES",
                DEFAULT_AUTH_TRANSACTION_TTL_MINUTES,
            )?,
            auth_reaper_period_minutes: parsed(
                "AUTH_REAPER_PERIOD_MINUTES",
                DEFAULT_AUTH_REAPER_PERIOD_MINUTES,
            )?,
            used_code_ceiling: parsed("USED_CODE_CEILING", DEFAULT_USED_CODE_CEILING)?,
            fetch_timeout_secs: parsed("PROVIDER_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,

            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            kms_location: env::var("KMS_LOCATION")
                .unwrap_or_else(|_| DEFAULT_KMS_LOCATION.to_string()),
            kms_key_ring: env::var("KMS_KEY_RING")
                .unwrap_or_else(|_| DEFAULT_KMS_KEY_RING.to_string()),
            kms_key_name: env::var("KMS_KEY_NAME")
                .unwrap_or_else(|_| DEFAULT_KMS_KEY_NAME.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            webhook_secret: required("WEBHOOK_SECRET")?.into_bytes(),
        })
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_minutes * 60)
    }

    pub fn auth_transaction_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_transaction_ttl_minutes * 60)
    }

    pub fn auth_reaper_period(&self) -> Duration {
        Duration::from_secs(self.auth_reaper_period_minutes * 60)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

/// Read an optional numeric variable, falling back to `default` when unset.
fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
