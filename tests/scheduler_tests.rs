// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync scheduler tests, run on a paused clock.

mod common;

use common::{healthy_bundle, MockSource, StaticTokens};
use std::sync::Arc;
use std::time::Duration;
use wearable_link::db::{MemoryDb, SharedRepository};
use wearable_link::error::AppError;
use wearable_link::models::SampleCategory;
use wearable_link::services::{HealthAggregator, ScoringConfig, SyncScheduler};

const INTERVAL: Duration = Duration::from_secs(60 * 60);
const MINUTE: Duration = Duration::from_secs(60);

struct Harness {
    scheduler: SyncScheduler,
    db: Arc<MemoryDb>,
    source: Arc<MockSource>,
    tokens: Arc<StaticTokens>,
}

fn harness(fetch_timeout: Duration) -> Harness {
    let db = Arc::new(MemoryDb::new());
    let source = Arc::new(MockSource::new(healthy_bundle()));
    let repo: SharedRepository = db.clone();
    let aggregator = Arc::new(HealthAggregator::new(
        source.clone(),
        repo,
        ScoringConfig::default(),
        fetch_timeout,
    ));

    Harness {
        scheduler: SyncScheduler::new(aggregator),
        db,
        source,
        tokens: Arc::new(StaticTokens::default()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_syncs_immediately_and_arms_timer() {
    let h = harness(Duration::from_secs(10));

    let summary = h
        .scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();

    assert_eq!(summary.health_score, 98);
    assert_eq!(h.source.rounds(), 1);
    assert!(h.scheduler.is_active("user-1"));
    assert_eq!(h.scheduler.interval("user-1"), Some(INTERVAL));
    assert_eq!(h.scheduler.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_fire_every_interval() {
    let h = harness(Duration::from_secs(10));
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();

    // Not before the first interval elapses
    tokio::time::sleep(INTERVAL - MINUTE).await;
    assert_eq!(h.source.rounds(), 1);

    tokio::time::sleep(2 * MINUTE).await;
    assert_eq!(h.source.rounds(), 2);

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(h.source.rounds(), 4);
    assert_eq!(h.db.health_record_count("user-1"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_and_is_idempotent() {
    let h = harness(Duration::from_secs(10));
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();

    assert!(h.scheduler.stop("user-1").await);
    assert!(!h.scheduler.is_active("user-1"));
    assert!(!h.scheduler.stop("user-1").await);
    assert!(!h.scheduler.stop("never-started").await);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.source.rounds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_users_leave_no_lock_entries() {
    let h = harness(Duration::from_secs(10));
    for i in 0..50 {
        let user = format!("user-{}", i);
        h.scheduler
            .start(&user, h.tokens.clone(), INTERVAL)
            .await
            .unwrap();
        assert!(h.scheduler.stop(&user).await);
    }
    assert!(!h.scheduler.stop("never-started").await);

    assert_eq!(h.scheduler.active_count(), 0);
    assert_eq!(h.scheduler.lock_entries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_existing_schedule() {
    let h = harness(Duration::from_secs(10));
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL * 2)
        .await
        .unwrap();

    assert_eq!(h.scheduler.active_count(), 1);
    assert_eq!(h.scheduler.interval("user-1"), Some(INTERVAL * 2));

    // The old one-hour timer must not fire
    tokio::time::sleep(INTERVAL + MINUTE).await;
    assert_eq!(h.source.rounds(), 2);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.source.rounds(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let h = harness(INTERVAL * 3);
    h.source.delay(SampleCategory::DailySummary, 90 * MINUTE);

    // Immediate sync runs 0..90 min, so the 60 min tick finds it busy.
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();
    assert_eq!(h.source.rounds(), 1);

    // 120 min tick runs until 210 min
    tokio::time::sleep(35 * MINUTE).await;
    assert_eq!(h.source.rounds(), 2);
    assert!(h.scheduler.is_syncing("user-1"));

    tokio::time::sleep(75 * MINUTE).await;
    assert_eq!(h.source.rounds(), 2);
    assert_eq!(h.source.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_sync_keeps_schedule() {
    let h = harness(Duration::from_secs(10));
    h.tokens.revoke();

    let result = h
        .scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await;

    assert!(matches!(result, Err(AppError::TokenUnavailable(_))));
    assert!(h.scheduler.is_active("user-1"));
    assert_eq!(h.tokens.calls(), 1);

    tokio::time::sleep(INTERVAL * 2 + MINUTE).await;
    assert_eq!(h.tokens.calls(), 3);
    assert!(h.scheduler.is_active("user-1"));
    assert_eq!(h.db.health_record_count("user-1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_sync_finish() {
    let h = harness(INTERVAL * 3);
    h.scheduler
        .start("user-1", h.tokens.clone(), INTERVAL)
        .await
        .unwrap();
    h.source.delay(SampleCategory::DailySummary, 30 * MINUTE);

    // The 60 min tick is mid-fetch at 61 min
    tokio::time::sleep(INTERVAL + MINUTE).await;
    assert!(h.scheduler.is_syncing("user-1"));
    assert!(h.scheduler.stop("user-1").await);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.db.health_record_count("user-1"), 2);
    assert_eq!(h.source.rounds(), 2);
    // The in-flight sync's lock goes once it finishes
    assert_eq!(h.scheduler.lock_entries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_everything() {
    let h = harness(Duration::from_secs(10));
    for user in ["user-1", "user-2", "user-3"] {
        h.scheduler
            .start(user, h.tokens.clone(), INTERVAL)
            .await
            .unwrap();
    }
    assert_eq!(h.scheduler.active_count(), 3);

    h.scheduler.shutdown();

    assert_eq!(h.scheduler.active_count(), 0);
    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(h.source.rounds(), 3);
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let h = harness(Duration::from_secs(10));
    let result = h
        .scheduler
        .start("user-1", h.tokens.clone(), Duration::ZERO)
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(!h.scheduler.is_active("user-1"));
    assert_eq!(h.scheduler.lock_entries(), 0);
}
