// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The sync subsystem only sees the repository traits below. Production uses
//! [`FirestoreDb`]; offline runs and tests use [`MemoryDb`].

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{HealthRecord, User, UserTokens};
use async_trait::async_trait;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TOKENS: &str = "provider_tokens";
    pub const HEALTH_RECORDS: &str = "health_records";
}

/// User profiles, including the rolling health-stats projection.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    async fn save_user(&self, user: &User) -> Result<(), AppError>;

    /// Fold a stored record into the user's health stats as one atomic
    /// read-modify-write, creating the user if needed.
    ///
    /// Only `health_stats` and `last_active` are written. Returns `false` if
    /// the record had already been applied.
    async fn apply_health_record(&self, record: &HealthRecord, now: &str)
        -> Result<bool, AppError>;

    /// Mark the provider link active (`Some(connected_at)`) or inactive (`None`).
    ///
    /// Connecting creates a missing user; disconnecting a missing user is a
    /// no-op. Other user fields are left alone.
    async fn set_provider_connection(
        &self,
        user_id: &str,
        connected_at: Option<&str>,
    ) -> Result<(), AppError>;

    /// Users whose provider link is active (for re-arming schedules at startup).
    async fn list_connected_users(&self) -> Result<Vec<User>, AppError>;
}

/// Append-only scored health records.
#[async_trait]
pub trait HealthRepository: Send + Sync {
    /// Insert a new record. Fails if a record with the same ID exists.
    async fn create_health_record(&self, record: &HealthRecord) -> Result<(), AppError>;

    /// Records from the last `days` days, newest first.
    async fn find_recent_health_records(
        &self,
        user_id: &str,
        days: u32,
    ) -> Result<Vec<HealthRecord>, AppError>;
}

/// Provider OAuth tokens per user.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError>;

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError>;

    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError>;
}

/// Everything the service persists.
pub trait Repository: UserRepository + HealthRepository + TokenRepository {}

impl<T> Repository for T where T: UserRepository + HealthRepository + TokenRepository {}

/// Shared handle injected into services.
pub type SharedRepository = Arc<dyn Repository>;

/// Earliest `recorded_at` (RFC 3339) included in a `days`-long lookback.
pub(crate) fn lookback_cutoff(days: u32) -> String {
    crate::time_utils::format_utc_rfc3339(
        chrono::Utc::now() - chrono::Duration::days(i64::from(days)),
    )
}
