//! Rolling health statistics projection for efficient dashboard queries.
//!
//! The projection is refreshed after every successfully persisted health
//! record so the dashboard can read one document instead of scanning records.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::HealthRecord;

/// Latest per-category scores for a user. Higher is better for every field.
///
/// Stored on the user document (`users/{user_id}.health_stats`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthStats {
    // ─── Scores ──────────────────────────────────────────────────
    #[serde(default)]
    pub sleep_quality: f64,
    /// Inverted stress (100 − average level)
    #[serde(default)]
    pub stress: f64,
    #[serde(default)]
    pub hydration: f64,
    #[serde(default)]
    pub energy: f64,
    /// Activity-duration score; 0 when no activity data arrived
    #[serde(default)]
    pub activity: f64,
    #[serde(default)]
    pub health_score: u8,

    // ─── Metadata ────────────────────────────────────────────────
    /// Number of records folded into this projection
    #[serde(default)]
    pub total_syncs: u32,
    /// ID of the record the scores were copied from
    #[serde(default)]
    pub last_record_id: String,
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            sleep_quality: 50.0,
            stress: 50.0,
            hydration: 50.0,
            energy: 50.0,
            activity: 0.0,
            health_score: 75,
            total_syncs: 0,
            last_record_id: String::new(),
            updated_at: String::new(),
        }
    }
}

impl HealthStats {
    /// Copy the scores of a newly persisted record.
    ///
    /// Returns `false` (and changes nothing) if the record was already applied.
    pub fn update_from_record(&mut self, record: &HealthRecord, now: &str) -> bool {
        if self.last_record_id == record.id {
            return false;
        }

        let metrics = &record.metrics;
        self.sleep_quality = metrics.sleep.quality;
        self.stress = 100.0 - metrics.stress.level;
        self.hydration = metrics.hydration.score;
        self.energy = metrics.energy.level;
        self.activity = record.category_scores.activity.unwrap_or(0.0);
        self.health_score = record.health_score;

        self.total_syncs += 1;
        self.last_record_id = record.id.clone();
        self.updated_at = now.to_string();

        true
    }
}
