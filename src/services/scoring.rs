// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Health scoring: pure functions from a sample bundle to scored metrics.
//!
//! Nothing here does I/O, so the same bundle always scores the same way
//! whether it came from a scheduled sync or a webhook delivery.

use crate::models::health::{
    ActivityMetrics, Anomaly, AnomalyKind, CategoryScores, EnergyMetrics, HealthMetrics,
    HydrationMetrics, Intensity, Severity, SleepMetrics, StressMetrics,
};
use crate::models::{HealthSampleBundle, SleepSample};

/// Weights and thresholds behind every score.
///
/// The defaults define the user-visible scores; change them deliberately.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    // Sleep quality
    pub sleep_duration_points: f64,
    pub sleep_deep_points: f64,
    pub sleep_rem_points: f64,
    pub ideal_sleep_min_hours: f64,
    pub ideal_sleep_max_hours: f64,
    pub target_deep_ratio: f64,
    pub target_rem_ratio: f64,
    pub default_sleep_quality: f64,

    // Hydration
    pub hydration_target_ml: f64,
    pub default_hydration_score: f64,

    // Energy
    pub energy_base: f64,
    pub energy_sleep_delta: f64,
    pub energy_stress_delta: f64,
    pub energy_high_steps_bonus: f64,
    pub energy_moderate_steps_bonus: f64,
    pub well_rested_hours: f64,
    pub sleep_deprived_hours: f64,
    pub low_stress_level: f64,
    pub high_stress_level: f64,
    pub high_steps: u32,
    pub moderate_steps: u32,

    // Composite
    pub step_goal: f64,
    pub active_minutes_goal: f64,
    pub steps_weight: f64,
    pub sleep_weight: f64,
    pub stress_weight: f64,
    pub activity_weight: f64,
    pub fallback_health_score: u8,

    // Neutral stress level recorded when no stress data arrived
    pub default_stress_level: f64,

    // Anomalies
    pub anomaly_max_steps: u32,
    pub anomaly_min_steps: u32,
    pub anomaly_min_sleep_hours: f64,
    pub anomaly_max_sleep_hours: f64,
    pub anomaly_max_stress: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sleep_duration_points: 40.0,
            sleep_deep_points: 30.0,
            sleep_rem_points: 30.0,
            ideal_sleep_min_hours: 7.0,
            ideal_sleep_max_hours: 9.0,
            target_deep_ratio: 0.15,
            target_rem_ratio: 0.20,
            default_sleep_quality: 50.0,

            hydration_target_ml: 2250.0,
            default_hydration_score: 50.0,

            energy_base: 50.0,
            energy_sleep_delta: 20.0,
            energy_stress_delta: 20.0,
            energy_high_steps_bonus: 10.0,
            energy_moderate_steps_bonus: 5.0,
            well_rested_hours: 7.0,
            sleep_deprived_hours: 6.0,
            low_stress_level: 30.0,
            high_stress_level: 70.0,
            high_steps: 10_000,
            moderate_steps: 7_000,

            step_goal: 10_000.0,
            active_minutes_goal: 30.0,
            steps_weight: 0.25,
            sleep_weight: 0.25,
            stress_weight: 0.25,
            activity_weight: 0.25,
            fallback_health_score: 75,

            default_stress_level: 50.0,

            anomaly_max_steps: 50_000,
            anomaly_min_steps: 1_000,
            anomaly_min_sleep_hours: 4.0,
            anomaly_max_sleep_hours: 12.0,
            anomaly_max_stress: 90.0,
        }
    }
}

/// Everything derived from one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredBundle {
    pub metrics: HealthMetrics,
    pub category_scores: CategoryScores,
    pub health_score: u8,
    pub anomalies: Vec<Anomaly>,
}

/// Score a bundle.
pub fn score_bundle(bundle: &HealthSampleBundle, config: &ScoringConfig) -> ScoredBundle {
    let sleep_quality = sleep_quality_score(bundle.sleep.as_ref(), config);
    let category_scores = category_scores(bundle, config);

    let metrics = HealthMetrics {
        sleep: SleepMetrics {
            hours: bundle.sleep_hours(),
            quality: sleep_quality,
        },
        stress: stress_metrics(bundle, config),
        hydration: HydrationMetrics {
            score: hydration_score(
                bundle.daily_summary.as_ref().and_then(|d| d.hydration_ml),
                config,
            ),
        },
        energy: energy_level(bundle, config),
        activity: activity_metrics(bundle),
    };

    ScoredBundle {
        metrics,
        health_score: composite_health_score(&category_scores, config),
        category_scores,
        anomalies: detect_anomalies(bundle, config),
    }
}

/// Sleep quality 0–100 from duration, deep ratio and REM ratio.
///
/// Missing sleep data scores the neutral default.
pub fn sleep_quality_score(sleep: Option<&SleepSample>, config: &ScoringConfig) -> f64 {
    let Some(sleep) = sleep else {
        return config.default_sleep_quality;
    };
    if sleep.total_minutes == 0 {
        return config.default_sleep_quality;
    }

    let hours = sleep.hours();
    let duration_factor = if hours >= config.ideal_sleep_min_hours
        && hours <= config.ideal_sleep_max_hours
    {
        1.0
    } else if hours >= config.ideal_sleep_min_hours - 1.0
        && hours <= config.ideal_sleep_max_hours + 1.0
    {
        0.75
    } else if hours >= config.ideal_sleep_min_hours - 2.0 {
        0.5
    } else {
        0.25
    };

    let total = f64::from(sleep.total_minutes);
    let deep_ratio = f64::from(sleep.deep_minutes) / total;
    let rem_ratio = f64::from(sleep.rem_minutes) / total;

    let score = config.sleep_duration_points * duration_factor
        + config.sleep_deep_points * (deep_ratio / config.target_deep_ratio).min(1.0)
        + config.sleep_rem_points * (rem_ratio / config.target_rem_ratio).min(1.0);

    score.clamp(0.0, 100.0)
}

/// Hydration score from logged intake; missing or zero intake scores the default.
pub fn hydration_score(hydration_ml: Option<f64>, config: &ScoringConfig) -> f64 {
    match hydration_ml {
        Some(ml) if ml > 0.0 && ml.is_finite() => {
            (ml / config.hydration_target_ml * 100.0).min(100.0)
        }
        _ => config.default_hydration_score,
    }
}

/// Energy level 0–100 with the factors that moved it.
pub fn energy_level(bundle: &HealthSampleBundle, config: &ScoringConfig) -> EnergyMetrics {
    let mut level = config.energy_base;
    let mut factors = Vec::new();

    if let Some(hours) = bundle.sleep_hours() {
        if hours >= config.well_rested_hours {
            level += config.energy_sleep_delta;
            factors.push("well_rested".to_string());
        } else if hours < config.sleep_deprived_hours {
            level -= config.energy_sleep_delta;
            factors.push("sleep_deprived".to_string());
        }
    }

    if let Some(stress) = bundle.average_stress() {
        if stress < config.low_stress_level {
            level += config.energy_stress_delta;
            factors.push("low_stress".to_string());
        } else if stress > config.high_stress_level {
            level -= config.energy_stress_delta;
            factors.push("high_stress".to_string());
        }
    }

    if let Some(steps) = bundle.steps() {
        if steps >= config.high_steps {
            level += config.energy_high_steps_bonus;
            factors.push("very_active".to_string());
        } else if steps >= config.moderate_steps {
            level += config.energy_moderate_steps_bonus;
            factors.push("active".to_string());
        }
    }

    EnergyMetrics {
        level: level.clamp(0.0, 100.0),
        factors,
    }
}

fn stress_metrics(bundle: &HealthSampleBundle, config: &ScoringConfig) -> StressMetrics {
    let mut factors = Vec::new();

    if let Some(max) = bundle.stress.as_ref().and_then(|s| s.max_level) {
        if max > config.high_stress_level {
            factors.push("peak_stress".to_string());
        }
    }
    if bundle
        .sleep_hours()
        .is_some_and(|hours| hours < config.sleep_deprived_hours)
    {
        factors.push("short_sleep".to_string());
    }
    if bundle
        .heart_rate
        .as_ref()
        .and_then(|hr| hr.resting_bpm)
        .is_some_and(|bpm| bpm > 80.0)
    {
        factors.push("elevated_resting_heart_rate".to_string());
    }

    StressMetrics {
        level: bundle
            .average_stress()
            .filter(|level| level.is_finite())
            .map(|level| level.clamp(0.0, 100.0))
            .unwrap_or(config.default_stress_level),
        factors,
    }
}

fn activity_metrics(bundle: &HealthSampleBundle) -> ActivityMetrics {
    let duration_minutes = bundle.active_minutes().unwrap_or(0);
    let activity_type = bundle
        .activity_summary
        .as_ref()
        .and_then(|a| a.primary_session())
        .map(|s| s.exercise_type.clone())
        .unwrap_or_else(|| "none".to_string());

    let intensity = if duration_minutes >= 60 {
        Intensity::High
    } else if duration_minutes >= 30 {
        Intensity::Moderate
    } else {
        Intensity::Low
    };

    ActivityMetrics {
        duration_minutes,
        activity_type,
        intensity,
    }
}

/// Sub-scores for the composite; a missing category stays `None`.
pub fn category_scores(bundle: &HealthSampleBundle, config: &ScoringConfig) -> CategoryScores {
    CategoryScores {
        steps: bundle
            .steps()
            .map(|steps| (f64::from(steps) / config.step_goal * 100.0).min(100.0)),
        sleep: bundle
            .sleep
            .as_ref()
            .map(|sleep| sleep_quality_score(Some(sleep), config)),
        stress: bundle
            .average_stress()
            .map(|level| 100.0 - level.clamp(0.0, 100.0)),
        activity: bundle
            .active_minutes()
            .map(|minutes| (f64::from(minutes) / config.active_minutes_goal * 100.0).min(100.0)),
    }
}

/// Weighted average of the present sub-scores, rescaled over their weights.
///
/// No categories at all, or a non-finite result, yields the fallback score.
pub fn composite_health_score(scores: &CategoryScores, config: &ScoringConfig) -> u8 {
    let weighted = [
        (scores.steps, config.steps_weight),
        (scores.sleep, config.sleep_weight),
        (scores.stress, config.stress_weight),
        (scores.activity, config.activity_weight),
    ];

    let mut sum = 0.0;
    let mut weight_total = 0.0;
    let mut factors = 0;
    for (score, weight) in weighted {
        if let Some(score) = score {
            sum += score * weight;
            weight_total += weight;
            factors += 1;
        }
    }

    if factors == 0 {
        return config.fallback_health_score;
    }

    let score = sum / weight_total;
    if !score.is_finite() {
        return config.fallback_health_score;
    }

    score.round().clamp(0.0, 100.0) as u8
}

/// Flag implausible values. Advisory only.
pub fn detect_anomalies(bundle: &HealthSampleBundle, config: &ScoringConfig) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if let Some(steps) = bundle.steps() {
        if steps > config.anomaly_max_steps {
            anomalies.push(Anomaly {
                kind: AnomalyKind::HighSteps,
                severity: Severity::Medium,
                value: f64::from(steps),
                message: format!("Unusually high step count: {}", steps),
            });
        } else if steps < config.anomaly_min_steps {
            anomalies.push(Anomaly {
                kind: AnomalyKind::LowSteps,
                severity: Severity::Low,
                value: f64::from(steps),
                message: format!("Very low step count: {}", steps),
            });
        }
    }

    if let Some(hours) = bundle.sleep_hours() {
        if hours < config.anomaly_min_sleep_hours {
            anomalies.push(Anomaly {
                kind: AnomalyKind::InsufficientSleep,
                severity: Severity::High,
                value: hours,
                message: format!("Insufficient sleep: {:.1}h", hours),
            });
        } else if hours > config.anomaly_max_sleep_hours {
            anomalies.push(Anomaly {
                kind: AnomalyKind::ExcessiveSleep,
                severity: Severity::Medium,
                value: hours,
                message: format!("Excessive sleep: {:.1}h", hours),
            });
        }
    }

    if let Some(stress) = bundle.average_stress() {
        if stress > config.anomaly_max_stress {
            anomalies.push(Anomaly {
                kind: AnomalyKind::HighStress,
                severity: Severity::High,
                value: stress,
                message: format!("Very high average stress: {:.0}", stress),
            });
        }
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivitySummary, DailySummary, ExerciseSession, StressSample};

    fn ideal_sleep(hours: f64) -> SleepSample {
        let total = (hours * 60.0) as u32;
        SleepSample {
            total_minutes: total,
            deep_minutes: total / 5,
            rem_minutes: total / 4,
            light_minutes: total - total / 5 - total / 4,
            awake_minutes: 10,
        }
    }

    fn bundle(
        steps: Option<u32>,
        sleep: Option<SleepSample>,
        stress: Option<f64>,
        active_minutes: Option<u32>,
    ) -> HealthSampleBundle {
        HealthSampleBundle {
            daily_summary: steps.map(|steps| DailySummary {
                steps,
                active_minutes,
                ..Default::default()
            }),
            activity_summary: active_minutes.map(|minutes| ActivitySummary {
                sessions: vec![ExerciseSession {
                    exercise_type: "running".to_string(),
                    duration_minutes: minutes,
                    calories: None,
                }],
            }),
            sleep,
            heart_rate: None,
            stress: stress.map(|average_level| StressSample {
                average_level,
                max_level: None,
            }),
        }
    }

    #[test]
    fn test_perfect_inputs_score_100() {
        let config = ScoringConfig::default();
        let scored = score_bundle(
            &bundle(Some(10_000), Some(ideal_sleep(8.0)), Some(0.0), Some(30)),
            &config,
        );
        assert_eq!(scored.health_score, 100);
        assert_eq!(scored.metrics.sleep.quality, 100.0);
    }

    #[test]
    fn test_all_missing_falls_back_to_75() {
        let config = ScoringConfig::default();
        let scored = score_bundle(&HealthSampleBundle::default(), &config);
        assert_eq!(scored.health_score, 75);
        assert_eq!(scored.category_scores, CategoryScores::default());
    }

    #[test]
    fn test_non_finite_falls_back_to_75() {
        let config = ScoringConfig::default();
        let scores = CategoryScores {
            steps: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(composite_health_score(&scores, &config), 75);

        let scores = CategoryScores {
            stress: Some(f64::INFINITY),
            sleep: Some(80.0),
            ..Default::default()
        };
        assert_eq!(composite_health_score(&scores, &config), 75);
    }

    #[test]
    fn test_missing_sleep_rescales_remaining() {
        let config = ScoringConfig::default();
        // steps 50, stress 100 - 40 = 60, activity 100 -> mean 70
        let scored = score_bundle(&bundle(Some(5_000), None, Some(40.0), Some(45)), &config);
        assert_eq!(scored.category_scores.sleep, None);
        assert_eq!(scored.health_score, 70);
        // A zeroed sleep contribution would have given 53
        assert_ne!(scored.health_score, 53);
    }

    #[test]
    fn test_composite_with_stress_10() {
        let config = ScoringConfig::default();
        let scored = score_bundle(
            &bundle(Some(12_000), Some(ideal_sleep(8.0)), Some(10.0), Some(40)),
            &config,
        );
        // (100 + 100 + 90 + 100) / 4 = 97.5
        assert_eq!(scored.health_score, 98);
        assert!(scored.anomalies.is_empty());
    }

    #[test]
    fn test_out_of_range_stress_is_clamped() {
        let config = ScoringConfig::default();
        let scored = score_bundle(&bundle(None, None, Some(150.0), None), &config);

        assert_eq!(scored.metrics.stress.level, 100.0);
        assert_eq!(scored.category_scores.stress, Some(0.0));
        assert_eq!(scored.health_score, 0);

        let calm = score_bundle(&bundle(None, None, Some(-20.0), None), &config);
        assert_eq!(calm.category_scores.stress, Some(100.0));
        assert_eq!(calm.health_score, 100);
    }

    #[test]
    fn test_hydration_score() {
        let config = ScoringConfig::default();
        assert_eq!(hydration_score(Some(2250.0), &config), 100.0);
        assert_eq!(hydration_score(Some(4500.0), &config), 100.0);
        assert_eq!(hydration_score(Some(1125.0), &config), 50.0);
        assert_eq!(hydration_score(Some(0.0), &config), 50.0);
        assert_eq!(hydration_score(None, &config), 50.0);
    }

    #[test]
    fn test_sleep_quality_missing_is_neutral() {
        let config = ScoringConfig::default();
        assert_eq!(sleep_quality_score(None, &config), 50.0);
    }

    #[test]
    fn test_sleep_quality_grading() {
        let config = ScoringConfig::default();
        // Ideal split but only 5.5h: 0.5 * 40 + 30 + 30
        assert_eq!(sleep_quality_score(Some(&ideal_sleep(5.5)), &config), 80.0);
        // 9.5h: second band
        assert_eq!(sleep_quality_score(Some(&ideal_sleep(9.5)), &config), 90.0);
        // 3h: lowest band
        assert_eq!(sleep_quality_score(Some(&ideal_sleep(3.0)), &config), 70.0);

        // 8h with half the target deep and REM share
        let thin = SleepSample {
            total_minutes: 480,
            deep_minutes: 36,
            rem_minutes: 48,
            light_minutes: 396,
            awake_minutes: 0,
        };
        assert!((sleep_quality_score(Some(&thin), &config) - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_energy_clamped_and_factored() {
        let config = ScoringConfig::default();
        let high = energy_level(
            &bundle(Some(12_000), Some(ideal_sleep(8.0)), Some(10.0), None),
            &config,
        );
        assert_eq!(high.level, 100.0);
        assert_eq!(high.factors, vec!["well_rested", "low_stress", "very_active"]);

        let low = energy_level(
            &bundle(Some(2_000), Some(ideal_sleep(4.5)), Some(85.0), None),
            &config,
        );
        assert_eq!(low.level, 10.0);

        let base = energy_level(&HealthSampleBundle::default(), &config);
        assert_eq!(base.level, 50.0);
        assert!(base.factors.is_empty());

        let moderate = energy_level(&bundle(Some(7_500), None, None, None), &config);
        assert_eq!(moderate.level, 55.0);
    }

    #[test]
    fn test_anomalies() {
        let config = ScoringConfig::default();

        let high_steps = detect_anomalies(&bundle(Some(60_000), None, None, None), &config);
        assert_eq!(high_steps.len(), 1);
        assert_eq!(high_steps[0].kind, AnomalyKind::HighSteps);
        assert_eq!(high_steps[0].severity, Severity::Medium);

        let low_steps = detect_anomalies(&bundle(Some(500), None, None, None), &config);
        assert_eq!(low_steps[0].kind, AnomalyKind::LowSteps);
        assert_eq!(low_steps[0].severity, Severity::Low);

        let short = detect_anomalies(&bundle(None, Some(ideal_sleep(3.5)), None, None), &config);
        assert_eq!(short[0].kind, AnomalyKind::InsufficientSleep);
        assert_eq!(short[0].severity, Severity::High);

        let long = detect_anomalies(&bundle(None, Some(ideal_sleep(13.0)), None, None), &config);
        assert_eq!(long[0].kind, AnomalyKind::ExcessiveSleep);
        assert_eq!(long[0].severity, Severity::Medium);

        let stressed = detect_anomalies(&bundle(None, None, Some(95.0), None), &config);
        assert_eq!(stressed[0].kind, AnomalyKind::HighStress);
        assert_eq!(stressed[0].severity, Severity::High);

        assert!(detect_anomalies(&HealthSampleBundle::default(), &config).is_empty());
    }

    #[test]
    fn test_activity_metrics() {
        let scored = score_bundle(
            &bundle(None, None, None, Some(65)),
            &ScoringConfig::default(),
        );
        assert_eq!(scored.metrics.activity.activity_type, "running");
        assert_eq!(scored.metrics.activity.intensity, Intensity::High);
        assert_eq!(scored.metrics.activity.duration_minutes, 65);

        let idle = score_bundle(&HealthSampleBundle::default(), &ScoringConfig::default());
        assert_eq!(idle.metrics.activity.activity_type, "none");
        assert_eq!(idle.metrics.activity.intensity, Intensity::Low);
    }

    #[test]
    fn test_stress_metrics_default_and_factors() {
        let config = ScoringConfig::default();
        let missing = score_bundle(&HealthSampleBundle::default(), &config);
        assert_eq!(missing.metrics.stress.level, 50.0);

        let mut stressed = bundle(None, Some(ideal_sleep(5.0)), Some(60.0), None);
        stressed.stress = Some(StressSample {
            average_level: 60.0,
            max_level: Some(95.0),
        });
        let scored = score_bundle(&stressed, &config);
        assert_eq!(scored.metrics.stress.level, 60.0);
        assert_eq!(scored.metrics.stress.factors, vec!["peak_stress", "short_sleep"]);
    }
}
