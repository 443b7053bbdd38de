// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Health aggregation: fetch, score and persist one sync tick.
//!
//! A tick pulls the five provider categories concurrently, each bounded by
//! its own timeout, scores whatever arrived, writes one new health record and
//! then folds it into the user's rolling stats.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::db::SharedRepository;
use crate::error::{AppError, Result};
use crate::models::health::EXTERNAL_PROVIDER_SOURCE;
use crate::models::{
    ActivitySummary, DailySummary, HealthRecord, HealthSampleBundle, HeartRateSample,
    SampleCategory, SleepSample, StressSample,
};
use crate::services::scoring::{score_bundle, ScoringConfig};
use crate::time_utils::{format_date_key, format_utc_rfc3339};

/// Random bytes appended to each record ID.
const RECORD_ID_RANDOM_BYTES: usize = 6;

/// Supplies a usable provider access token for a user.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, user_id: &str) -> Result<String>;
}

/// Per-category reads against the provider's health API.
///
/// `Ok(None)` means the provider had nothing for that day.
#[async_trait]
pub trait HealthDataSource: Send + Sync {
    async fn daily_summary(&self, access_token: &str, date: &str)
        -> Result<Option<DailySummary>>;

    async fn activities(&self, access_token: &str, date: &str)
        -> Result<Option<ActivitySummary>>;

    async fn sleep(&self, access_token: &str, date: &str) -> Result<Option<SleepSample>>;

    async fn heart_rate(&self, access_token: &str, date: &str)
        -> Result<Option<HeartRateSample>>;

    async fn stress(&self, access_token: &str, date: &str) -> Result<Option<StressSample>>;
}

/// Outcome of a successful tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub record_id: String,
    pub health_score: u8,
    pub missing_categories: Vec<SampleCategory>,
    pub anomaly_count: usize,
}

/// Turns provider samples into persisted health records.
pub struct HealthAggregator {
    source: Arc<dyn HealthDataSource>,
    repo: SharedRepository,
    scoring: ScoringConfig,
    fetch_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        source: Arc<dyn HealthDataSource>,
        repo: SharedRepository,
        scoring: ScoringConfig,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            repo,
            scoring,
            fetch_timeout,
        }
    }

    /// Run one full sync tick for a user.
    ///
    /// A token failure aborts before anything is fetched or written.
    pub async fn sync_user(&self, user_id: &str, tokens: &dyn TokenProvider) -> Result<SyncSummary> {
        let access_token = tokens.access_token(user_id).await.map_err(|e| {
            tracing::warn!(user_id, error = %e, "No usable provider token, skipping sync");
            match e {
                AppError::TokenUnavailable(_) => e,
                other => AppError::TokenUnavailable(other.to_string()),
            }
        })?;

        let bundle = self.fetch_bundle(user_id, &access_token).await;
        self.persist(user_id, &bundle).await
    }

    /// Score and persist a bundle pushed by the provider.
    pub async fn ingest(&self, user_id: &str, bundle: &HealthSampleBundle) -> Result<SyncSummary> {
        if bundle.is_empty() {
            return Err(AppError::BadRequest(
                "payload contains no health data".to_string(),
            ));
        }
        self.persist(user_id, bundle).await
    }

    /// Fetch all categories concurrently. Failed or slow categories are `None`.
    pub async fn fetch_bundle(&self, user_id: &str, access_token: &str) -> HealthSampleBundle {
        let date = format_date_key(Utc::now());
        let source = self.source.as_ref();

        let (daily_summary, activity_summary, sleep, heart_rate, stress) = tokio::join!(
            self.bounded(
                user_id,
                SampleCategory::DailySummary,
                source.daily_summary(access_token, &date)
            ),
            self.bounded(
                user_id,
                SampleCategory::Activities,
                source.activities(access_token, &date)
            ),
            self.bounded(
                user_id,
                SampleCategory::Sleep,
                source.sleep(access_token, &date)
            ),
            self.bounded(
                user_id,
                SampleCategory::HeartRate,
                source.heart_rate(access_token, &date)
            ),
            self.bounded(
                user_id,
                SampleCategory::Stress,
                source.stress(access_token, &date)
            ),
        );

        HealthSampleBundle {
            daily_summary,
            activity_summary,
            sleep,
            heart_rate,
            stress,
        }
    }

    async fn bounded<T>(
        &self,
        user_id: &str,
        category: SampleCategory,
        fetch: impl Future<Output = Result<Option<T>>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => {
                tracing::warn!(
                    user_id,
                    category = category.as_str(),
                    error = %e,
                    "Category fetch failed"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    user_id,
                    category = category.as_str(),
                    timeout_secs = self.fetch_timeout.as_secs(),
                    "Category fetch timed out"
                );
                None
            }
        }
    }

    /// Write the record, then update the rolling stats.
    ///
    /// If the record write fails the stats are left untouched.
    async fn persist(&self, user_id: &str, bundle: &HealthSampleBundle) -> Result<SyncSummary> {
        let record = self.build_record(user_id, bundle)?;

        self.repo.create_health_record(&record).await?;

        let now = format_utc_rfc3339(Utc::now());
        self.repo.apply_health_record(&record, &now).await?;

        tracing::info!(
            user_id,
            record_id = %record.id,
            health_score = record.health_score,
            missing = record.missing_categories.len(),
            anomalies = record.anomalies.len(),
            "Health record stored"
        );

        Ok(SyncSummary {
            record_id: record.id,
            health_score: record.health_score,
            anomaly_count: record.anomalies.len(),
            missing_categories: record.missing_categories,
        })
    }

    fn build_record(&self, user_id: &str, bundle: &HealthSampleBundle) -> Result<HealthRecord> {
        let now = Utc::now();
        let scored = score_bundle(bundle, &self.scoring);
        let raw_provider_metrics = serde_json::to_value(bundle)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode bundle: {}", e)))?;

        Ok(HealthRecord {
            id: record_id(user_id, now)?,
            user_id: user_id.to_string(),
            date: format_date_key(now),
            recorded_at: format_utc_rfc3339(now),
            metrics: scored.metrics,
            health_score: scored.health_score,
            category_scores: scored.category_scores,
            anomalies: scored.anomalies,
            missing_categories: bundle.missing_categories(),
            source: EXTERNAL_PROVIDER_SOURCE.to_string(),
            raw_provider_metrics,
        })
    }
}

/// `{user_id}_{millis}_{random hex}`; the suffix keeps same-millisecond
/// records for one user apart.
fn record_id(user_id: &str, now: DateTime<Utc>) -> Result<String> {
    let mut suffix = [0u8; RECORD_ID_RANDOM_BYTES];
    SystemRandom::new()
        .fill(&mut suffix)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;
    Ok(format!(
        "{}_{}_{}",
        user_id,
        now.timestamp_millis(),
        hex::encode(suffix)
    ))
}
