// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the repository traits on top of three collections:
//! - Users (profile + rolling health stats)
//! - Provider tokens
//! - Health records (append-only)

use crate::db::{collections, lookback_cutoff, HealthRepository, TokenRepository, UserRepository};
use crate::error::AppError;
use crate::models::{HealthRecord, User, UserTokens};
use async_trait::async_trait;
use firestore::{paths, FirestoreConsistencySelector};

/// Upper bound on records returned by a lookback query.
const MAX_RECENT_RECORDS: u32 = 500;

/// Commits retried when a concurrent writer touched the same user.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::Persistence(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Persistence(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── Atomic User Updates ────────────────────────────────────────

    /// Read-modify-write one user document inside a transaction.
    ///
    /// The read goes through the transaction, so a concurrent write to the
    /// same user makes the commit fail; the whole read-modify-write is then
    /// retried with fresh data. `mutate` returns the fields it changed, or
    /// `None` to skip the write. A missing user is created in full when
    /// `create_at` is set, and skipped otherwise.
    ///
    /// Returns whether a write was committed.
    async fn modify_user<F>(
        &self,
        user_id: &str,
        create_at: Option<&str>,
        mutate: F,
    ) -> Result<bool, AppError>
    where
        F: Fn(&mut User) -> Option<Vec<String>> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let mut transaction = self.client.begin_transaction().await.map_err(|e| {
                AppError::Persistence(format!("Failed to begin transaction: {}", e))
            })?;

            let reader = self
                .client
                .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                    transaction.transaction_id().clone(),
                ));
            let current: Option<User> = reader
                .fluent()
                .select()
                .by_id_in(collections::USERS)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| {
                    AppError::Persistence(format!("Failed to read user in transaction: {}", e))
                })?;

            let (mut user, existed) = match (current, create_at) {
                (Some(user), _) => (user, true),
                (None, Some(now)) => (User::new(user_id, now), false),
                (None, None) => {
                    let _ = transaction.rollback().await;
                    return Ok(false);
                }
            };

            let Some(changed) = mutate(&mut user) else {
                let _ = transaction.rollback().await;
                return Ok(false);
            };

            // Existing users only get the changed fields; new ones are written whole
            let update = self.client.fluent().update();
            let update = if existed {
                update.fields(changed)
            } else {
                update
            };
            update
                .in_col(collections::USERS)
                .document_id(user_id)
                .object(&user)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Persistence(format!("Failed to add user to transaction: {}", e))
                })?;

            match transaction.commit().await {
                Ok(_) => return Ok(true),
                Err(e) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(user_id, attempt, error = %e, "User transaction conflict, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Persistence(format!(
                        "Transaction commit failed: {}",
                        e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl UserRepository for FirestoreDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.user_id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn apply_health_record(
        &self,
        record: &HealthRecord,
        now: &str,
    ) -> Result<bool, AppError> {
        self.modify_user(&record.user_id, Some(now), |user| {
            let applied = user
                .health_stats
                .get_or_insert_with(Default::default)
                .update_from_record(record, now);
            if !applied {
                return None;
            }
            user.last_active = now.to_string();
            Some(paths!(User::{health_stats, last_active}))
        })
        .await
    }

    async fn set_provider_connection(
        &self,
        user_id: &str,
        connected_at: Option<&str>,
    ) -> Result<(), AppError> {
        self.modify_user(user_id, connected_at, |user| match connected_at {
            Some(now) => {
                user.provider_connected = true;
                user.connected_at = Some(now.to_string());
                user.last_active = now.to_string();
                Some(paths!(User::{provider_connected, connected_at, last_active}))
            }
            None => {
                user.provider_connected = false;
                user.connected_at = None;
                Some(paths!(User::{provider_connected, connected_at}))
            }
        })
        .await?;
        Ok(())
    }

    async fn list_connected_users(&self) -> Result<Vec<User>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("provider_connected").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl HealthRepository for FirestoreDb {
    async fn create_health_record(&self, record: &HealthRecord) -> Result<(), AppError> {
        // A plain insert, so an ID collision fails instead of overwriting
        let _: HealthRecord = self
            .client
            .fluent()
            .insert()
            .into(collections::HEALTH_RECORDS)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn find_recent_health_records(
        &self,
        user_id: &str,
        days: u32,
    ) -> Result<Vec<HealthRecord>, AppError> {
        let user_id = user_id.to_string();
        let cutoff = lookback_cutoff(days);

        self.client
            .fluent()
            .select()
            .from(collections::HEALTH_RECORDS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("recorded_at")
                        .greater_than_or_equal(cutoff.clone()),
                ])
            })
            .order_by([(
                "recorded_at",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(MAX_RECENT_RECORDS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl TokenRepository for FirestoreDb {
    async fn get_tokens(&self, user_id: &str) -> Result<Option<UserTokens>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))
    }

    async fn set_tokens(&self, user_id: &str, tokens: &UserTokens) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::TOKENS)
            .document_id(user_id)
            .object(tokens)
            .execute()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn delete_tokens(&self, user_id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collections::TOKENS)
            .document_id(user_id)
            .execute()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?;
        Ok(())
    }
}
