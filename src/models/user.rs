// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use serde::{Deserialize, Serialize};

use crate::models::HealthStats;

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Application user ID (also used as document ID)
    pub user_id: String,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    pub display_name: String,
    /// Whether a wearable provider is currently linked
    #[serde(default)]
    pub provider_connected: bool,
    /// When the provider was linked (ISO 8601)
    #[serde(default)]
    pub connected_at: Option<String>,
    /// Rolling projection of the latest scores
    #[serde(default)]
    pub health_stats: Option<HealthStats>,
    /// When user first connected
    pub created_at: String,
    /// Last activity timestamp
    pub last_active: String,
}

impl User {
    /// A bare profile for a user we only know by ID.
    pub fn new(user_id: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: None,
            display_name: String::new(),
            provider_connected: false,
            connected_at: None,
            health_stats: None,
            created_at: now.to_string(),
            last_active: now.to_string(),
        }
    }
}

/// User's provider OAuth tokens (encrypted in Firestore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
}
