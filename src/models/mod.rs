// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod health;
pub mod samples;
pub mod stats;
pub mod user;

pub use health::{Anomaly, AnomalyKind, CategoryScores, HealthMetrics, HealthRecord, Severity};
pub use samples::{
    ActivitySummary, DailySummary, ExerciseSession, HealthSampleBundle, HeartRateSample,
    SampleCategory, SleepSample, StressSample,
};
pub use stats::HealthStats;
pub use user::{User, UserTokens};
