// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scored health record model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::samples::SampleCategory;

/// Value of `HealthRecord::source` for provider-derived records.
pub const EXTERNAL_PROVIDER_SOURCE: &str = "external_provider";

/// One persisted, scored snapshot of a user's health metrics.
///
/// Records are append-only: every sync tick creates a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Document ID (`{user_id}_{unix_millis}`)
    pub id: String,
    pub user_id: String,
    /// Calendar date the metrics describe ("YYYY-MM-DD")
    pub date: String,
    /// When the record was produced (RFC 3339)
    pub recorded_at: String,
    pub metrics: HealthMetrics,
    /// Composite score, always within 0..=100
    pub health_score: u8,
    pub category_scores: CategoryScores,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    /// Categories the provider returned nothing for
    #[serde(default)]
    pub missing_categories: Vec<SampleCategory>,
    /// Always "external_provider"
    pub source: String,
    /// The bundle the record was scored from
    pub raw_provider_metrics: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthMetrics {
    pub sleep: SleepMetrics,
    pub stress: StressMetrics,
    pub hydration: HydrationMetrics,
    pub energy: EnergyMetrics,
    pub activity: ActivityMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SleepMetrics {
    /// Hours asleep, absent when no sleep data arrived
    pub hours: Option<f64>,
    pub quality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StressMetrics {
    /// Average stress, 0 (calm) to 100
    pub level: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HydrationMetrics {
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EnergyMetrics {
    pub level: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActivityMetrics {
    pub duration_minutes: u32,
    /// Type of the longest session, or "none"
    #[serde(rename = "type")]
    pub activity_type: String,
    pub intensity: Intensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

/// Per-category sub-scores feeding the composite; `None` marks a missing category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CategoryScores {
    pub steps: Option<f64>,
    pub sleep: Option<f64>,
    /// Inverted stress (100 − average level)
    pub stress: Option<f64>,
    pub activity: Option<f64>,
}

/// An implausible value flagged for review. Never blocks the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub value: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighSteps,
    LowSteps,
    InsufficientSleep,
    ExcessiveSleep,
    HighStress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}
