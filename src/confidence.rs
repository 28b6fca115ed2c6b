//! Result confidence scoring
//!
//! Scores how much trust to put in a single analysis result, from data
//! quality alone: how many regions reported, how mature the rolling windows
//! are, and whether the stream has gone stale. Confidence deliberately never
//! looks at the analysis outputs themselves, so a high-risk result and a
//! low-risk result over the same quality of data score the same.

use crate::config::EngineConfig;
use crate::types::{BodyRegion, SessionSample};
use crate::window::SessionSnapshot;

const COVERAGE_WEIGHT: f64 = 0.5;
const MATURITY_WEIGHT: f64 = 0.5;

/// Window length at which statistics are considered fully settled
const MATURITY_TARGET: u64 = 30;

/// Gaps up to this many expected frame intervals carry no penalty
const ALLOWED_GAP_INTERVALS: f64 = 10.0;

/// Data-quality confidence scorer
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Score the trustworthiness of one result in [0,1].
    pub fn score(
        sample: &SessionSample,
        snapshot: &SessionSnapshot,
        config: &EngineConfig,
    ) -> f64 {
        let coverage = sample.regions.len() as f64 / BodyRegion::ALL.len() as f64;
        let maturity = (snapshot.sample_count as f64 / MATURITY_TARGET as f64).min(1.0);

        let base = COVERAGE_WEIGHT * coverage + MATURITY_WEIGHT * maturity;
        (base * staleness_factor(snapshot.last_gap_s, config)).clamp(0.0, 1.0)
    }
}

/// Multiplicative penalty for inter-sample gaps well beyond the expected
/// frame cadence. 1.0 for the first sample and for gaps within tolerance.
fn staleness_factor(last_gap_s: Option<f64>, config: &EngineConfig) -> f64 {
    let gap = match last_gap_s {
        Some(gap) if gap > 0.0 => gap,
        _ => return 1.0,
    };
    let allowed = config.expected_frame_interval_s * ALLOWED_GAP_INTERVALS;
    if gap <= allowed {
        1.0
    } else {
        (allowed / gap).max(0.1)
    }
}
