//! Region distress ranking
//!
//! Orders the body regions reported in the current sample by their relative
//! distress contribution. Each region is normalized against its OWN rolling
//! range, so a naturally twitchy hand does not drown out a subtle chest
//! signal. Smoothed (EMA) values are ranked rather than instantaneous ones
//! to keep the ordering from flapping frame to frame.

use crate::types::{BodyRegion, RegionScore, SessionSample};
use crate::window::SessionSnapshot;

const STRESS_WEIGHT: f64 = 0.6;
const TREMOR_WEIGHT: f64 = 0.4;

const RANGE_EPSILON: f64 = 1e-9;

/// Ranker over the regions present in one sample
pub struct RegionRanker;

impl RegionRanker {
    /// Rank the regions reported in `sample`, descending by composite score.
    /// Regions absent from the sample are excluded, not scored zero. Ties
    /// break by canonical region order, so repeated calls on the same inputs
    /// yield the same ordering.
    pub fn rank(sample: &SessionSample, snapshot: &SessionSnapshot) -> Vec<RegionScore> {
        let mut scores: Vec<RegionScore> = sample
            .regions
            .keys()
            .filter_map(|region| {
                let state = snapshot.regions.get(region)?;
                let stress_component =
                    min_max_normalize(state.ema_stress, state.stress.min, state.stress.max);
                let tremor_component =
                    min_max_normalize(state.ema_tremor, state.tremor.min, state.tremor.max);
                Some(RegionScore {
                    region: *region,
                    score: STRESS_WEIGHT * stress_component + TREMOR_WEIGHT * tremor_component,
                    stress_component,
                    tremor_component,
                })
            })
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.region.ordinal().cmp(&b.region.ordinal()))
        });
        scores
    }
}

/// Position of `value` within [min, max], clamped to [0,1]. A degenerate
/// range carries no relative signal and normalizes to zero.
fn min_max_normalize(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range < RANGE_EPSILON {
        0.0
    } else {
        ((value - min) / range).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{GlobalMetrics, SensorFrame};
    use crate::window::SessionStore;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn frame(stress: f64, tremor: f64) -> SensorFrame {
        SensorFrame {
            tremor_intensity: tremor,
            stress_trend: stress,
            stress_timer: 0.0,
            orientation: Default::default(),
            delta_orientation: Default::default(),
            average_speed: 1.0,
        }
    }

    fn sample(regions: &[(BodyRegion, SensorFrame)]) -> SessionSample {
        SessionSample {
            session_id: "s1".to_string(),
            participant_id: "p1".to_string(),
            sequence: 0,
            taken_at: Utc::now(),
            regions: regions.iter().cloned().collect(),
            metrics: GlobalMetrics { focus: 0.9 },
        }
    }

    fn feed(store: &mut SessionStore, samples: Vec<SessionSample>) -> SessionSample {
        let mut last = None;
        for s in samples {
            let (accepted, _) = store.append(s).unwrap();
            last = Some(accepted);
        }
        last.expect("at least one sample")
    }

    #[test]
    fn escalating_region_ranks_first() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());

        // Chest climbs toward its own ceiling; head stays mid-range.
        let samples: Vec<SessionSample> = (0..30)
            .map(|i| {
                sample(&[
                    (BodyRegion::Chest, frame(i as f64 * 0.5, 0.2)),
                    (BodyRegion::Head, frame(3.0 + (i % 2) as f64, 0.2)),
                ])
            })
            .collect();
        let last = feed(&mut store, samples);
        let snapshot = store.snapshot("s1").unwrap();

        let ranked = RegionRanker::rank(&last, &snapshot);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].region, BodyRegion::Chest);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn absent_regions_are_excluded() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());

        let warmup: Vec<SessionSample> = (0..10)
            .map(|_| {
                sample(&[
                    (BodyRegion::Head, frame(2.0, 0.3)),
                    (BodyRegion::LeftHand, frame(1.0, 0.1)),
                ])
            })
            .collect();
        feed(&mut store, warmup);
        // Left hand stops reporting
        let last = feed(&mut store, vec![sample(&[(BodyRegion::Head, frame(2.0, 0.3))])]);
        let snapshot = store.snapshot("s1").unwrap();

        let ranked = RegionRanker::rank(&last, &snapshot);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].region, BodyRegion::Head);
    }

    #[test]
    fn ties_break_in_canonical_order() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());

        // Identical histories produce identical scores
        let samples: Vec<SessionSample> = (0..10)
            .map(|i| {
                let v = i as f64;
                sample(&[
                    (BodyRegion::RightHand, frame(v, v * 0.1)),
                    (BodyRegion::Hip, frame(v, v * 0.1)),
                ])
            })
            .collect();
        let last = feed(&mut store, samples);
        let snapshot = store.snapshot("s1").unwrap();

        let ranked = RegionRanker::rank(&last, &snapshot);
        assert_eq!(ranked[0].region, BodyRegion::Hip);
        assert_eq!(ranked[1].region, BodyRegion::RightHand);

        // Same inputs, same ordering
        let again = RegionRanker::rank(&last, &snapshot);
        assert_eq!(ranked, again);
    }

    #[test]
    fn flat_history_scores_zero() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());

        let samples: Vec<SessionSample> = (0..10)
            .map(|_| sample(&[(BodyRegion::Head, frame(5.0, 1.0))]))
            .collect();
        let last = feed(&mut store, samples);
        let snapshot = store.snapshot("s1").unwrap();

        let ranked = RegionRanker::rank(&last, &snapshot);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let config = EngineConfig::default();
        let mut store = SessionStore::new(&config);
        store.open("s1", "p1", Utc::now());

        let samples: Vec<SessionSample> = (0..40)
            .map(|i| sample(&[(BodyRegion::Chest, frame((i * 7 % 13) as f64, (i * 3 % 5) as f64))]))
            .collect();
        let last = feed(&mut store, samples);
        let snapshot = store.snapshot("s1").unwrap();

        for score in RegionRanker::rank(&last, &snapshot) {
            assert!((0.0..=1.0).contains(&score.score));
            assert!((0.0..=1.0).contains(&score.stress_component));
            assert!((0.0..=1.0).contains(&score.tremor_component));
        }
    }
}
