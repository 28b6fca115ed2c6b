//! Stability index
//!
//! Reduces the current sample plus the rolling snapshot into a single 0-100
//! steadiness score. The score combines, per reported region, the absolute
//! stress/tremor level with the clamped standard score against the region's
//! own rolling baseline, plus a persistence penalty for sustained stress
//! timers. More tremor or stress never increases the score.

use crate::config::EngineConfig;
use crate::stats::{self, Z_CLAMP};
use crate::types::{SessionSample, StabilityIndex};
use crate::window::SessionSnapshot;

/// Neutral score returned while the rolling window is too short for
/// reliable statistics.
pub const NEUTRAL_STABILITY: f64 = 50.0;

/// Tremor normalization range on the raw sensor scale
const TREMOR_SCALE: f64 = 10.0;

/// Component weights, summing to 100
const STRESS_WEIGHT: f64 = 45.0;
const TREMOR_WEIGHT: f64 = 35.0;
const PERSISTENCE_WEIGHT: f64 = 20.0;

/// Stability index calculator
pub struct StabilityCalculator;

impl StabilityCalculator {
    /// Compute the stability index for `sample` against `snapshot`.
    ///
    /// Returns the neutral mid-range value flagged `cold_start` when the
    /// window holds fewer than `min_history_samples` samples, or when the
    /// sample reports no regions at all.
    pub fn compute(
        sample: &SessionSample,
        snapshot: &SessionSnapshot,
        config: &EngineConfig,
    ) -> StabilityIndex {
        if snapshot.sample_count < config.min_history_samples as u64 || sample.regions.is_empty() {
            return StabilityIndex {
                value: NEUTRAL_STABILITY,
                cold_start: true,
            };
        }

        // Worst reported region drives each distress component.
        let mut stress_component: f64 = 0.0;
        let mut tremor_component: f64 = 0.0;
        let mut persistence: f64 = 0.0;

        for (region, frame) in &sample.regions {
            let region_snapshot = match snapshot.regions.get(region) {
                Some(s) => s,
                None => continue,
            };

            let stress_level =
                (frame.stress_trend.max(0.0) / config.stress_trend_critical).clamp(0.0, 1.0);
            let stress_z = stats::z_score(
                frame.stress_trend,
                region_snapshot.stress.mean,
                region_snapshot.stress.std,
            )
            .max(0.0)
                / Z_CLAMP;
            stress_component = stress_component.max(0.5 * stress_level + 0.5 * stress_z);

            let tremor_level = (frame.tremor_intensity / TREMOR_SCALE).clamp(0.0, 1.0);
            let tremor_z = stats::z_score(
                frame.tremor_intensity,
                region_snapshot.tremor.mean,
                region_snapshot.tremor.std,
            )
            .max(0.0)
                / Z_CLAMP;
            tremor_component = tremor_component.max(0.5 * tremor_level + 0.5 * tremor_z);

            let timer_norm =
                (frame.stress_timer / (2.0 * config.stress_timer_critical.max(1e-9))).clamp(0.0, 1.0);
            persistence = persistence.max(timer_norm);
        }

        let value = (100.0
            - STRESS_WEIGHT * stress_component
            - TREMOR_WEIGHT * tremor_component
            - PERSISTENCE_WEIGHT * persistence)
            .clamp(0.0, 100.0);

        StabilityIndex {
            value,
            cold_start: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyRegion, GlobalMetrics, SensorFrame, SessionSample};
    use crate::window::SessionStore;
    use chrono::Utc;

    fn frame(stress: f64, tremor: f64, timer: f64) -> SensorFrame {
        SensorFrame {
            tremor_intensity: tremor,
            stress_trend: stress,
            stress_timer: timer,
            orientation: Default::default(),
            delta_orientation: Default::default(),
            average_speed: 1.0,
        }
    }

    fn sample(stress: f64, tremor: f64, timer: f64) -> SessionSample {
        SessionSample {
            session_id: "s1".to_string(),
            participant_id: "p1".to_string(),
            sequence: 0,
            taken_at: Utc::now(),
            regions: [(BodyRegion::Head, frame(stress, tremor, timer))]
                .into_iter()
                .collect(),
            metrics: GlobalMetrics { focus: 0.9 },
        }
    }

    /// Feed ten calm samples, then score `latest` against that baseline.
    fn score_after_baseline(latest: SessionSample, config: &EngineConfig) -> StabilityIndex {
        let mut store = SessionStore::new(config);
        store.open("s1", "p1", Utc::now());
        for _ in 0..10 {
            store.append(sample(1.0, 0.3, 0.0)).unwrap();
        }
        let (accepted, snapshot) = store.append(latest).unwrap();
        StabilityCalculator::compute(&accepted, &snapshot, config)
    }

    #[test]
    fn cold_start_returns_neutral() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());
        let (accepted, snapshot) = store.append(sample(3.0, 1.0, 0.0)).unwrap();
        let stability = StabilityCalculator::compute(&accepted, &snapshot, &config);
        assert_eq!(stability.value, NEUTRAL_STABILITY);
        assert!(stability.cold_start);
    }

    #[test]
    fn calm_sample_scores_high() {
        let config = EngineConfig::default();
        let stability = score_after_baseline(sample(1.0, 0.3, 0.0), &config);
        assert!(!stability.cold_start);
        assert!(stability.value > 85.0, "got {}", stability.value);
    }

    #[test]
    fn distressed_sample_scores_low() {
        let config = EngineConfig::default();
        let stability = score_after_baseline(sample(18.0, 8.0, 5.0), &config);
        assert!(stability.value < 30.0, "got {}", stability.value);
    }

    #[test]
    fn score_is_always_in_range() {
        let config = EngineConfig::default();
        for (stress, tremor, timer) in [
            (0.0, 0.0, 0.0),
            (100.0, 100.0, 100.0),
            (50.0, 0.0, 0.0),
            (0.0, 50.0, 20.0),
        ] {
            let stability = score_after_baseline(sample(stress, tremor, timer), &config);
            assert!((0.0..=100.0).contains(&stability.value));
        }
    }

    #[test]
    fn monotonic_non_increasing_in_tremor() {
        let config = EngineConfig::default();
        let mut previous = f64::INFINITY;
        for tremor in [0.0, 1.0, 2.5, 5.0, 8.0, 12.0] {
            let stability = score_after_baseline(sample(1.0, tremor, 0.0), &config);
            assert!(
                stability.value <= previous + 1e-9,
                "tremor {} raised stability from {} to {}",
                tremor,
                previous,
                stability.value
            );
            previous = stability.value;
        }
    }

    #[test]
    fn monotonic_non_increasing_in_stress() {
        let config = EngineConfig::default();
        let mut previous = f64::INFINITY;
        for stress in [0.0, 2.0, 5.0, 10.0, 15.0, 25.0] {
            let stability = score_after_baseline(sample(stress, 0.3, 0.0), &config);
            assert!(stability.value <= previous + 1e-9);
            previous = stability.value;
        }
    }

    #[test]
    fn empty_sample_is_neutral_not_stable() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());
        for _ in 0..10 {
            store.append(sample(1.0, 0.3, 0.0)).unwrap();
        }
        let mut empty = sample(0.0, 0.0, 0.0);
        empty.regions.clear();
        let (accepted, snapshot) = store.append(empty).unwrap();
        let stability = StabilityCalculator::compute(&accepted, &snapshot, &config);
        assert_eq!(stability.value, NEUTRAL_STABILITY);
        assert!(stability.cold_start);
    }
}
