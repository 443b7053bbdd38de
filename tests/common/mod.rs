// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wearable_link::config::Config;
use wearable_link::db::{FirestoreDb, MemoryDb, SharedRepository};
use wearable_link::error::{AppError, Result};
use wearable_link::models::{
    ActivitySummary, DailySummary, ExerciseSession, HealthSampleBundle, HeartRateSample,
    SampleCategory, SleepSample, StressSample,
};
use wearable_link::routes::create_router;
use wearable_link::services::{HealthDataSource, KmsService, TokenProvider};
use wearable_link::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Health data source serving a fixed bundle, with per-category failure
/// and delay injection.
#[derive(Default)]
pub struct MockSource {
    bundle: Mutex<HealthSampleBundle>,
    failing: Mutex<HashSet<SampleCategory>>,
    delays: Mutex<HashMap<SampleCategory, Duration>>,
    /// Completed-or-started fetch rounds (one per daily-summary call)
    rounds: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl MockSource {
    pub fn new(bundle: HealthSampleBundle) -> Self {
        Self {
            bundle: Mutex::new(bundle),
            ..Default::default()
        }
    }

    pub fn set_bundle(&self, bundle: HealthSampleBundle) {
        *self.bundle.lock().unwrap() = bundle;
    }

    pub fn fail(&self, category: SampleCategory) {
        self.failing.lock().unwrap().insert(category);
    }

    pub fn delay(&self, category: SampleCategory, delay: Duration) {
        self.delays.lock().unwrap().insert(category, delay);
    }

    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn serve<T>(
        &self,
        category: SampleCategory,
        pick: impl FnOnce(&HealthSampleBundle) -> Option<T>,
    ) -> Result<Option<T>> {
        let delay = self.delays.lock().unwrap().get(&category).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&category) {
            return Err(AppError::UpstreamUnavailable(format!(
                "{} unavailable",
                category.as_str()
            )));
        }
        Ok(pick(&self.bundle.lock().unwrap()))
    }
}

#[async_trait]
impl HealthDataSource for MockSource {
    async fn daily_summary(&self, _token: &str, _date: &str) -> Result<Option<DailySummary>> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self
            .serve(SampleCategory::DailySummary, |b| b.daily_summary.clone())
            .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn activities(&self, _token: &str, _date: &str) -> Result<Option<ActivitySummary>> {
        self.serve(SampleCategory::Activities, |b| b.activity_summary.clone())
            .await
    }

    async fn sleep(&self, _token: &str, _date: &str) -> Result<Option<SleepSample>> {
        self.serve(SampleCategory::Sleep, |b| b.sleep.clone()).await
    }

    async fn heart_rate(&self, _token: &str, _date: &str) -> Result<Option<HeartRateSample>> {
        self.serve(SampleCategory::HeartRate, |b| b.heart_rate.clone())
            .await
    }

    async fn stress(&self, _token: &str, _date: &str) -> Result<Option<StressSample>> {
        self.serve(SampleCategory::Stress, |b| b.stress.clone()).await
    }
}

/// Token provider that always (or never) has a token.
#[derive(Default)]
pub struct StaticTokens {
    revoked: std::sync::atomic::AtomicBool,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StaticTokens {
    pub fn revoked() -> Self {
        let tokens = Self::default();
        tokens.revoke();
        tokens
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self, user_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            return Err(AppError::TokenUnavailable(format!(
                "token revoked for {}",
                user_id
            )));
        }
        Ok(format!("token-{}", user_id))
    }
}

/// 8 h of sleep with healthy stage ratios.
#[allow(dead_code)]
pub fn ideal_sleep() -> SleepSample {
    SleepSample {
        total_minutes: 480,
        deep_minutes: 96,
        rem_minutes: 120,
        light_minutes: 264,
        awake_minutes: 15,
    }
}

/// A complete, healthy day: 12000 steps, 8 h ideal sleep, stress 10, 40 active minutes.
#[allow(dead_code)]
pub fn healthy_bundle() -> HealthSampleBundle {
    HealthSampleBundle {
        daily_summary: Some(DailySummary {
            steps: 12_000,
            distance_meters: 9_000.0,
            calories: 2_400.0,
            active_minutes: Some(40),
            hydration_ml: Some(2_250.0),
        }),
        activity_summary: Some(ActivitySummary {
            sessions: vec![ExerciseSession {
                exercise_type: "running".to_string(),
                duration_minutes: 40,
                calories: Some(420.0),
            }],
        }),
        sleep: Some(ideal_sleep()),
        heart_rate: Some(HeartRateSample {
            resting_bpm: Some(58.0),
            average_bpm: Some(72.0),
            max_bpm: Some(165.0),
        }),
        stress: Some(StressSample {
            average_level: 10.0,
            max_level: Some(35.0),
        }),
    }
}

/// Everything a test needs to poke at the app.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub source: Arc<MockSource>,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let db = Arc::new(MemoryDb::new());
    let source = Arc::new(MockSource::new(healthy_bundle()));

    let repo: SharedRepository = db.clone();
    let state = Arc::new(AppState::new(
        config,
        repo,
        KmsService::new_mock(),
        source.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        source,
    }
}

/// Session JWT for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn session_token(user_id: &str) -> String {
    wearable_link::middleware::auth::create_jwt(
        user_id,
        &Config::test_default().jwt_signing_key,
    )
    .unwrap()
}
