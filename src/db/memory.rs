// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory repository backend for offline mode and tests.

use crate::db::{lookback_cutoff, HealthRepository, TokenRepository, UserRepository};
use crate::error::AppError;
use crate::models::{HealthRecord, User, UserTokens};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Repository backed by concurrent maps. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    tokens: DashMap<String, UserTokens>,
    health_records: DashMap<String, Vec<HealthRecord>>,
    fail_health_writes: AtomicBool,
    fail_user_writes: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent health-record write fail (for failure-path tests).
    pub fn set_fail_health_writes(&self, fail: bool) {
        self.fail_health_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent user write fail.
    pub fn set_fail_user_writes(&self, fail: bool) {
        self.fail_user_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of records stored for a user.
    pub fn health_record_count(&self, user_id: &str) -> usize {
        self.health_records
            .get(user_id)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl UserRepository for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("user write rejected".to_string()));
        }
        self.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn apply_health_record(
        &self,
        record: &HealthRecord,
        now: &str,
    ) -> Result<bool, AppError> {
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("user write rejected".to_string()));
        }
        // The entry guard holds the shard lock for the whole update
        let mut user = self
            .users
            .entry(record.user_id.clone())
            .or_insert_with(|| User::new(&record.user_id, now));
        let applied = user
            .health_stats
            .get_or_insert_with(Default::default)
            .update_from_record(record, now);
        if applied {
            user.last_active = now.to_string();
        }
        Ok(applied)
    }

    async fn set_provider_connection(
        &self,
        user_id: &str,
        connected_at: Option<&str>,
    ) -> Result<(), AppError> {
        if self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("user write rejected".to_string()));
        }
        match connected_at {
            Some(now) => {
                let mut user = self
                    .users
                    .entry(user_id.to_string())
                    .or_insert_with(|| User::new(user_id, now));
                user.provider_connected = true;
                user.connected_at = Some(now.to_string());
                user.last_active = now.to_string();
            }
            None => {
                if let Some(mut user) = self.users.get_mut(user_id) {
                    user.provider_connected = false;
                    user.connected_at = None;
                }
            }
        }
        Ok(())
    }

    async fn list_connected_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.provider_connected)
            .map(|u| u.clone())
            .collect())
    }
}

#[async_trait]
impl HealthRepository for MemoryDb {
    async fn create_health_record(&self, record: &HealthRecord) -> Result<(), AppError> {
        if self.fail_health_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence(
                "health record write rejected".to_string(),
            ));
        }
        let mut records = self.health_records.entry(record.user_id.clone()).or_default();
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(AppError::Persistence(format!(
                "health record {} already exists",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find_recent_health_records(
        &self,
        user_id: &str,
        days: u32,
    ) -> Result<Vec<HealthRecord>, AppError> {
        let cutoff = lookback_cutoff(days);
        let mut records: Vec<HealthRecord> = self
            .health_records
            .get(user_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.recorded_at >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }
}

#[async_trait]
impl TokenRepository for MemoryDb {
    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        Ok(self.tokens.get(user_id).map(|t| t.clone()))
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        self.tokens.insert(user_id.to_string(), tokens.clone());
        Ok(())
    }

    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.tokens.remove(user_id);
        Ok(())
    }
}
