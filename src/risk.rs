//! Risk classification
//!
//! Maps stability and observed per-region stress onto a discrete tier via an
//! explicit, ordered rule table. Rules are evaluated top to bottom and the
//! first match wins; higher-severity rules sit first, so any tie resolves
//! toward the more severe tier. Classification is a pure function of
//! (stability, current sample, thresholds): the forecast is advisory and is
//! never consulted here.

use crate::config::EngineConfig;
use crate::types::{RiskTier, SessionSample, StabilityIndex};

/// One auditable classification condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskCondition {
    /// Stability index strictly below the cutoff
    StabilityBelow(f64),
    /// Some region's observed stress trend at or above `trend` while its
    /// stress timer is at or above `timer` seconds
    SustainedStressAtLeast { trend: f64, timer: f64 },
    /// Some region's observed stress trend at or above the threshold
    StressAtLeast(f64),
}

impl RiskCondition {
    fn matches(&self, stability: &StabilityIndex, sample: &SessionSample) -> bool {
        match *self {
            RiskCondition::StabilityBelow(cutoff) => stability.value < cutoff,
            RiskCondition::SustainedStressAtLeast { trend, timer } => sample
                .regions
                .values()
                .any(|f| f.stress_trend >= trend && f.stress_timer >= timer),
            RiskCondition::StressAtLeast(threshold) => sample
                .regions
                .values()
                .any(|f| f.stress_trend >= threshold),
        }
    }
}

/// A (condition, tier) entry in the rule table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskRule {
    pub tier: RiskTier,
    pub condition: RiskCondition,
}

/// Ordered rule table built once from configuration.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    rules: Vec<RiskRule>,
}

impl RiskClassifier {
    pub fn from_config(config: &EngineConfig) -> Self {
        let rules = vec![
            RiskRule {
                tier: RiskTier::High,
                condition: RiskCondition::SustainedStressAtLeast {
                    trend: config.stress_trend_critical,
                    timer: config.stress_timer_critical,
                },
            },
            RiskRule {
                tier: RiskTier::High,
                condition: RiskCondition::StabilityBelow(config.stability_high_cutoff),
            },
            RiskRule {
                tier: RiskTier::Moderate,
                condition: RiskCondition::StressAtLeast(config.stress_trend_elevated),
            },
            RiskRule {
                tier: RiskTier::Moderate,
                condition: RiskCondition::StabilityBelow(config.stability_moderate_cutoff),
            },
        ];
        Self { rules }
    }

    /// The rule table, in evaluation order.
    pub fn rules(&self) -> &[RiskRule] {
        &self.rules
    }

    /// Classify one sample. First matching rule wins; no match is LOW.
    pub fn classify(&self, stability: &StabilityIndex, sample: &SessionSample) -> RiskTier {
        self.rules
            .iter()
            .find(|rule| rule.condition.matches(stability, sample))
            .map(|rule| rule.tier)
            .unwrap_or(RiskTier::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyRegion, GlobalMetrics, SensorFrame};
    use chrono::Utc;

    fn sample_with(stress: f64, timer: f64) -> SessionSample {
        SessionSample {
            session_id: "s1".to_string(),
            participant_id: "p1".to_string(),
            sequence: 0,
            taken_at: Utc::now(),
            regions: [(
                BodyRegion::Head,
                SensorFrame {
                    tremor_intensity: 0.5,
                    stress_trend: stress,
                    stress_timer: timer,
                    orientation: Default::default(),
                    delta_orientation: Default::default(),
                    average_speed: 1.0,
                },
            )]
            .into_iter()
            .collect(),
            metrics: GlobalMetrics { focus: 0.9 },
        }
    }

    fn stable(value: f64) -> StabilityIndex {
        StabilityIndex {
            value,
            cold_start: false,
        }
    }

    #[test]
    fn calm_sample_is_low() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let tier = classifier.classify(&stable(90.0), &sample_with(2.0, 0.0));
        assert_eq!(tier, RiskTier::Low);
    }

    #[test]
    fn sustained_critical_stress_is_high() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let tier = classifier.classify(&stable(90.0), &sample_with(18.0, 4.0));
        assert_eq!(tier, RiskTier::High);
    }

    #[test]
    fn critical_stress_without_timer_is_moderate() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        // Above the critical trend but not sustained: elevated rule matches
        let tier = classifier.classify(&stable(90.0), &sample_with(18.0, 0.5));
        assert_eq!(tier, RiskTier::Moderate);
    }

    #[test]
    fn low_stability_is_high_even_when_stress_is_calm() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let tier = classifier.classify(&stable(10.0), &sample_with(1.0, 0.0));
        assert_eq!(tier, RiskTier::High);
    }

    #[test]
    fn mid_stability_is_moderate() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let tier = classifier.classify(&stable(40.0), &sample_with(1.0, 0.0));
        assert_eq!(tier, RiskTier::Moderate);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let sample = sample_with(12.0, 1.0);
        let first = classifier.classify(&stable(70.0), &sample);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&stable(70.0), &sample), first);
        }
    }

    #[test]
    fn higher_severity_rules_are_ordered_first() {
        let classifier = RiskClassifier::from_config(&EngineConfig::default());
        let ranks: Vec<u8> = classifier.rules().iter().map(|r| r.tier.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ranks, sorted);
    }
}
