// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user recurring sync scheduling.
//!
//! Each connected user gets one timer task. Every tick hands the user to the
//! [`HealthAggregator`]; a tick that finds the user's previous aggregation
//! still running is skipped. Aggregations run in their own task, so aborting
//! a timer never cuts a record write short.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{AppError, Result};
use crate::services::aggregator::{HealthAggregator, SyncSummary, TokenProvider};

/// A user's armed timer.
struct SyncHandle {
    timer: JoinHandle<()>,
    interval: Duration,
}

/// Owns every user's sync timer.
pub struct SyncScheduler {
    aggregator: Arc<HealthAggregator>,
    handles: DashMap<String, SyncHandle>,
    /// Held while an aggregation for the user is running
    tick_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// Serializes start/stop for one user
    lifecycle_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SyncScheduler {
    pub fn new(aggregator: Arc<HealthAggregator>) -> Self {
        Self {
            aggregator,
            handles: DashMap::new(),
            tick_locks: Arc::new(DashMap::new()),
            lifecycle_locks: DashMap::new(),
        }
    }

    /// (Re)arm a user's schedule and run one sync immediately.
    ///
    /// Any existing schedule is cancelled first. The timer stays armed even
    /// if the immediate sync fails; its result is returned to the caller.
    pub async fn start(
        &self,
        user_id: &str,
        tokens: Arc<dyn TokenProvider>,
        interval: Duration,
    ) -> Result<SyncSummary> {
        if interval.is_zero() {
            return Err(AppError::InvalidInput(
                "sync interval must be positive".to_string(),
            ));
        }

        let tick_lock = lock_for(&self.tick_locks, user_id);
        {
            let lifecycle = lock_for(&self.lifecycle_locks, user_id);
            let _guard = lifecycle.lock().await;

            if let Some((_, previous)) = self.handles.remove(user_id) {
                previous.timer.abort();
                tracing::debug!(user_id, "Replaced existing sync schedule");
            }

            let timer = tokio::spawn(run_timer(
                user_id.to_string(),
                Arc::clone(&self.aggregator),
                Arc::clone(&tokens),
                Arc::clone(&tick_lock),
                interval,
            ));
            self.handles
                .insert(user_id.to_string(), SyncHandle { timer, interval });
        }

        tracing::info!(
            user_id,
            interval_secs = interval.as_secs(),
            "Sync schedule armed"
        );

        let guard = tick_lock.lock_owned().await;
        let aggregator = Arc::clone(&self.aggregator);
        let owned_user_id = user_id.to_string();
        let first = tokio::spawn(async move {
            let _guard = guard;
            aggregator.sync_user(&owned_user_id, tokens.as_ref()).await
        });

        match first.await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!(user_id, error = %e, "Initial sync failed");
                }
                result
            }
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "Initial sync task failed: {}",
                e
            ))),
        }
    }

    /// Cancel a user's schedule. Returns whether one was active.
    ///
    /// An aggregation already in flight still completes.
    pub async fn stop(&self, user_id: &str) -> bool {
        let lifecycle = lock_for(&self.lifecycle_locks, user_id);
        let guard = lifecycle.lock().await;

        let stopped = match self.handles.remove(user_id) {
            Some((_, handle)) => {
                handle.timer.abort();
                // Wait for the aborted timer to drop its lock reference
                let _ = handle.timer.await;
                tracing::info!(user_id, "Sync schedule stopped");
                true
            }
            None => false,
        };

        drop(guard);
        drop(lifecycle);
        self.release_locks(user_id);
        stopped
    }

    /// Cancel every schedule.
    pub fn shutdown(&self) {
        let mut stopped = 0;
        self.handles.retain(|_, handle| {
            handle.timer.abort();
            stopped += 1;
            false
        });
        // Aborted timers release their references asynchronously
        self.tick_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.lifecycle_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        tracing::info!(stopped, "Sync scheduler shut down");
    }

    /// Drop a user's lock entries once nothing holds them.
    ///
    /// A sync still in flight keeps its tick lock; the entry goes when that
    /// sync finishes, unless a new schedule has claimed it by then.
    fn release_locks(&self, user_id: &str) {
        if self.handles.contains_key(user_id) {
            return;
        }
        self.lifecycle_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);

        if self
            .tick_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
        {
            return;
        }
        let Some(busy) = self.tick_locks.get(user_id).map(|lock| Arc::clone(lock.value())) else {
            return;
        };
        let tick_locks = Arc::clone(&self.tick_locks);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            drop(busy.lock().await);
            drop(busy);
            tick_locks.remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
        });
    }

    /// Per-user lock entries still tracked.
    pub fn lock_entries(&self) -> usize {
        self.tick_locks.len() + self.lifecycle_locks.len()
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.handles.contains_key(user_id)
    }

    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    pub fn interval(&self, user_id: &str) -> Option<Duration> {
        self.handles.get(user_id).map(|handle| handle.interval)
    }

    /// Whether an aggregation for the user is running right now.
    pub fn is_syncing(&self, user_id: &str) -> bool {
        self.tick_locks
            .get(user_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

fn lock_for(locks: &DashMap<String, Arc<Mutex<()>>>, user_id: &str) -> Arc<Mutex<()>> {
    locks
        .entry(user_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

async fn run_timer(
    user_id: String,
    aggregator: Arc<HealthAggregator>,
    tokens: Arc<dyn TokenProvider>,
    tick_lock: Arc<Mutex<()>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let Ok(guard) = Arc::clone(&tick_lock).try_lock_owned() else {
            tracing::debug!(user_id = %user_id, "Previous sync still running, skipping tick");
            continue;
        };

        let aggregator = Arc::clone(&aggregator);
        let tokens = Arc::clone(&tokens);
        let tick_user_id = user_id.clone();
        let tick = tokio::spawn(async move {
            let _guard = guard;
            aggregator.sync_user(&tick_user_id, tokens.as_ref()).await
        });

        match tick.await {
            Ok(Ok(summary)) => {
                tracing::info!(
                    user_id = %user_id,
                    record_id = %summary.record_id,
                    health_score = summary.health_score,
                    "Scheduled sync complete"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Scheduled sync failed");
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Scheduled sync task panicked");
            }
        }
    }
}
