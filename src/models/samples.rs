// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Raw provider samples and the per-tick bundle they are joined into.

use serde::{Deserialize, Serialize};

/// Daily activity totals reported by the wearable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub steps: u32,
    #[serde(default)]
    pub distance_meters: f64,
    #[serde(default)]
    pub calories: f64,
    /// Minutes of moderate-or-better activity
    #[serde(default)]
    pub active_minutes: Option<u32>,
    /// Logged water intake in milliliters
    #[serde(default)]
    pub hydration_ml: Option<f64>,
}

/// A single recorded exercise session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSession {
    /// Exercise type as reported by the provider (e.g. "running")
    pub exercise_type: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub calories: Option<f64>,
}

/// Exercise sessions for the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    #[serde(default)]
    pub sessions: Vec<ExerciseSession>,
}

impl ActivitySummary {
    /// Sum of all session durations.
    pub fn total_minutes(&self) -> u32 {
        self.sessions.iter().map(|s| s.duration_minutes).sum()
    }

    /// Session with the longest duration.
    pub fn primary_session(&self) -> Option<&ExerciseSession> {
        self.sessions.iter().max_by_key(|s| s.duration_minutes)
    }
}

/// Last night's sleep, broken into stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepSample {
    /// Time asleep (excludes awake time)
    pub total_minutes: u32,
    #[serde(default)]
    pub deep_minutes: u32,
    #[serde(default)]
    pub rem_minutes: u32,
    #[serde(default)]
    pub light_minutes: u32,
    #[serde(default)]
    pub awake_minutes: u32,
}

impl SleepSample {
    pub fn hours(&self) -> f64 {
        f64::from(self.total_minutes) / 60.0
    }
}

/// Heart rate summary for the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    #[serde(default)]
    pub resting_bpm: Option<f64>,
    #[serde(default)]
    pub average_bpm: Option<f64>,
    #[serde(default)]
    pub max_bpm: Option<f64>,
}

/// Stress levels on the provider's 0–100 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StressSample {
    pub average_level: f64,
    #[serde(default)]
    pub max_level: Option<f64>,
}

/// Provider data category fetched independently on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleCategory {
    DailySummary,
    Activities,
    Sleep,
    HeartRate,
    Stress,
}

impl SampleCategory {
    pub const ALL: [SampleCategory; 5] = [
        SampleCategory::DailySummary,
        SampleCategory::Activities,
        SampleCategory::Sleep,
        SampleCategory::HeartRate,
        SampleCategory::Stress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleCategory::DailySummary => "daily_summary",
            SampleCategory::Activities => "activities",
            SampleCategory::Sleep => "sleep",
            SampleCategory::HeartRate => "heart_rate",
            SampleCategory::Stress => "stress",
        }
    }
}

/// Everything one sync tick (or one webhook delivery) gathered.
///
/// Every field is independently optional: a failed, timed-out or empty
/// upstream call leaves its field `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSampleBundle {
    #[serde(default)]
    pub daily_summary: Option<DailySummary>,
    #[serde(default)]
    pub activity_summary: Option<ActivitySummary>,
    #[serde(default)]
    pub sleep: Option<SleepSample>,
    #[serde(default)]
    pub heart_rate: Option<HeartRateSample>,
    #[serde(default)]
    pub stress: Option<StressSample>,
}

impl HealthSampleBundle {
    /// Categories that produced no data.
    pub fn missing_categories(&self) -> Vec<SampleCategory> {
        SampleCategory::ALL
            .into_iter()
            .filter(|category| match category {
                SampleCategory::DailySummary => self.daily_summary.is_none(),
                SampleCategory::Activities => self.activity_summary.is_none(),
                SampleCategory::Sleep => self.sleep.is_none(),
                SampleCategory::HeartRate => self.heart_rate.is_none(),
                SampleCategory::Stress => self.stress.is_none(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing_categories().len() == SampleCategory::ALL.len()
    }

    /// Active minutes from the daily summary, else summed exercise sessions.
    pub fn active_minutes(&self) -> Option<u32> {
        self.daily_summary
            .as_ref()
            .and_then(|d| d.active_minutes)
            .or_else(|| self.activity_summary.as_ref().map(|a| a.total_minutes()))
    }

    pub fn steps(&self) -> Option<u32> {
        self.daily_summary.as_ref().map(|d| d.steps)
    }

    pub fn sleep_hours(&self) -> Option<f64> {
        self.sleep.as_ref().map(SleepSample::hours)
    }

    pub fn average_stress(&self) -> Option<f64> {
        self.stress.as_ref().map(|s| s.average_level)
    }
}
