//! Session orchestrator
//!
//! `SessionAnalyzer` owns the full per-sample pipeline: normalize, append to
//! the rolling session state, then run every analysis stage over the
//! resulting snapshot and fold the outcome into the session's running
//! summary. One analyzer instance serves many concurrent sessions; each
//! session's state is keyed by its id and touched by exactly one ingest
//! call at a time.

use crate::anomaly::AnomalyDetector;
use crate::command::CommandPlanner;
use crate::confidence::ConfidenceScorer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::forecast::StressForecaster;
use crate::normalizer::FrameNormalizer;
use crate::regions::RegionRanker;
use crate::risk::RiskClassifier;
use crate::stability::StabilityCalculator;
use crate::types::{
    AnalysisResult, AnomalyKind, BodyRegion, ClinicalSummary, RawFrameRecord, RegionContribution,
    RiskTier, TierBreakdown,
};
use crate::window::{ClosedSession, SessionStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Orchestrates the analysis pipeline over live sessions.
pub struct SessionAnalyzer {
    config: EngineConfig,
    store: SessionStore,
    classifier: RiskClassifier,
    forecaster: StressForecaster,
    summaries: HashMap<String, SummaryAccumulator>,
}

impl SessionAnalyzer {
    /// Build an analyzer from validated configuration. Fails fast on an
    /// inconsistent config rather than producing skewed results later.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let store = SessionStore::new(&config);
        let classifier = RiskClassifier::from_config(&config);
        Ok(Self {
            config,
            store,
            classifier,
            forecaster: StressForecaster::new(),
            summaries: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn open_session_count(&self) -> usize {
        self.store.open_session_count()
    }

    /// Open a session. Opening an already-open session is a no-op.
    pub fn open_session(&mut self, session_id: &str, participant_id: &str) {
        self.open_session_at(session_id, participant_id, Utc::now());
    }

    pub fn open_session_at(
        &mut self,
        session_id: &str,
        participant_id: &str,
        now: DateTime<Utc>,
    ) {
        if !self.store.is_open(session_id) {
            log::info!("session {} opened for participant {}", session_id, participant_id);
        }
        self.store.open(session_id, participant_id, now);
        self.summaries
            .entry(session_id.to_string())
            .or_insert_with(SummaryAccumulator::new);
    }

    /// Ingest one raw frame, timestamped now.
    pub fn ingest(&mut self, raw: &RawFrameRecord) -> Result<AnalysisResult, EngineError> {
        self.ingest_at(raw, Utc::now())
    }

    /// Ingest one raw frame timestamped at `now` and run the full pipeline.
    ///
    /// A malformed or out-of-range frame is rejected without touching the
    /// session state. A frame for a session that was never opened, or was
    /// already closed, is rejected with `UnknownSession`; closing is final.
    pub fn ingest_at(
        &mut self,
        raw: &RawFrameRecord,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, EngineError> {
        let sample = FrameNormalizer::normalize(raw, now)?;
        if !self.store.is_open(&sample.session_id) {
            return Err(EngineError::UnknownSession(sample.session_id));
        }

        let (sample, snapshot) = self.store.append(sample)?;

        let stability = StabilityCalculator::compute(&sample, &snapshot, &self.config);
        let risk = self.classifier.classify(&stability, &sample);
        let forecast = self
            .forecaster
            .forecast(&sample.session_id, &snapshot, &self.config);
        let anomalies = AnomalyDetector::detect(&sample, &snapshot, &self.config);
        let ranked_regions = RegionRanker::rank(&sample, &snapshot);
        let confidence = ConfidenceScorer::score(&sample, &snapshot, &self.config);
        let command = CommandPlanner::plan(risk, &anomalies);

        let result = AnalysisResult {
            session_id: sample.session_id.clone(),
            sequence: sample.sequence,
            taken_at: sample.taken_at,
            stability,
            risk,
            forecast,
            anomalies,
            ranked_regions,
            confidence,
            command,
        };

        if let Some(accumulator) = self.summaries.get_mut(&result.session_id) {
            accumulator.fold(&result, &sample);
        }

        log::debug!(
            "session {} seq {} stability {:.1} risk {} command {}",
            result.session_id,
            result.sequence,
            result.stability.value,
            result.risk.as_str(),
            result.command.name.as_str()
        );
        Ok(result)
    }

    /// Close a session and produce its clinical summary. The session id is
    /// released: further frames for it are rejected, not re-opened.
    pub fn close_session(&mut self, session_id: &str) -> Result<ClinicalSummary, EngineError> {
        let closed = self.store.close(session_id)?;
        self.forecaster.forget(session_id);
        let accumulator = self
            .summaries
            .remove(session_id)
            .unwrap_or_else(SummaryAccumulator::new);
        let summary = accumulator.finish(&closed);
        log::info!(
            "session {} closed after {} samples, mean stability {:.1}",
            summary.session_id,
            summary.sample_count,
            summary.mean_stability
        );
        Ok(summary)
    }

    /// Close every session idle past the configured timeout, returning their
    /// summaries. Intended to be driven by a periodic caller.
    pub fn evict_idle(&mut self, now: DateTime<Utc>) -> Vec<ClinicalSummary> {
        self.store
            .evict_idle(now)
            .into_iter()
            .map(|closed| {
                log::warn!("session {} evicted after idle timeout", closed.session_id);
                self.forecaster.forget(&closed.session_id);
                let accumulator = self
                    .summaries
                    .remove(&closed.session_id)
                    .unwrap_or_else(SummaryAccumulator::new);
                accumulator.finish(&closed)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RegionAggregate {
    score_sum: f64,
    samples: u64,
    peak_stress: f64,
    peak_tremor: f64,
}

/// Running per-session aggregates folded in per accepted sample, so the
/// close-time summary never has to replay raw frames and memory stays
/// bounded regardless of session length.
#[derive(Debug, Clone, Default)]
struct SummaryAccumulator {
    sample_count: u64,
    stability_sum: f64,
    peak_stability: Option<f64>,
    lowest_stability: Option<f64>,
    time_in_tier: TierBreakdown,
    anomaly_counts: HashMap<AnomalyKind, u64>,
    regions: HashMap<BodyRegion, RegionAggregate>,
}

impl SummaryAccumulator {
    fn new() -> Self {
        Self::default()
    }

    fn fold(&mut self, result: &AnalysisResult, sample: &crate::types::SessionSample) {
        self.sample_count += 1;
        self.stability_sum += result.stability.value;
        self.peak_stability = Some(match self.peak_stability {
            Some(peak) => peak.max(result.stability.value),
            None => result.stability.value,
        });
        self.lowest_stability = Some(match self.lowest_stability {
            Some(low) => low.min(result.stability.value),
            None => result.stability.value,
        });

        match result.risk {
            RiskTier::Low => self.time_in_tier.low += 1,
            RiskTier::Moderate => self.time_in_tier.moderate += 1,
            RiskTier::High => self.time_in_tier.high += 1,
        }

        for anomaly in &result.anomalies {
            *self.anomaly_counts.entry(anomaly.kind).or_insert(0) += 1;
        }

        for score in &result.ranked_regions {
            let aggregate = self.regions.entry(score.region).or_default();
            aggregate.score_sum += score.score;
            aggregate.samples += 1;
        }
        for (region, frame) in &sample.regions {
            let aggregate = self.regions.entry(*region).or_default();
            aggregate.peak_stress = aggregate.peak_stress.max(frame.stress_trend);
            aggregate.peak_tremor = aggregate.peak_tremor.max(frame.tremor_intensity);
        }
    }

    fn finish(self, closed: &ClosedSession) -> ClinicalSummary {
        let mean_stability = if self.sample_count > 0 {
            self.stability_sum / self.sample_count as f64
        } else {
            0.0
        };

        let dominant_anomaly = self
            .anomaly_counts
            .iter()
            .max_by_key(|(kind, count)| (**count, std::cmp::Reverse(kind.as_str())))
            .map(|(kind, _)| *kind);

        let mut top_regions: Vec<RegionContribution> = self
            .regions
            .iter()
            .map(|(region, aggregate)| RegionContribution {
                region: *region,
                mean_score: if aggregate.samples > 0 {
                    aggregate.score_sum / aggregate.samples as f64
                } else {
                    0.0
                },
                peak_stress: aggregate.peak_stress,
                peak_tremor: aggregate.peak_tremor,
            })
            .collect();
        top_regions.sort_by(|a, b| {
            b.mean_score
                .partial_cmp(&a.mean_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.region.ordinal().cmp(&b.region.ordinal()))
        });

        let duration_s = match (closed.first_sample_at, closed.last_sample_at) {
            (Some(first), Some(last)) => {
                (last - first).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => 0.0,
        };

        let narrative = narrative_text(
            closed,
            duration_s,
            self.sample_count,
            mean_stability,
            self.lowest_stability,
            &self.time_in_tier,
            dominant_anomaly,
            self.anomaly_counts.values().sum(),
            top_regions.first(),
        );

        ClinicalSummary {
            report_id: Uuid::new_v4(),
            session_id: closed.session_id.clone(),
            participant_id: closed.participant_id.clone(),
            started_at: closed.first_sample_at,
            ended_at: closed.last_sample_at,
            duration_s,
            sample_count: self.sample_count,
            mean_stability,
            peak_stability: self.peak_stability.unwrap_or(0.0),
            lowest_stability: self.lowest_stability.unwrap_or(0.0),
            time_in_tier: self.time_in_tier,
            anomaly_counts: self.anomaly_counts,
            dominant_anomaly,
            top_regions,
            narrative,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn narrative_text(
    closed: &ClosedSession,
    duration_s: f64,
    sample_count: u64,
    mean_stability: f64,
    lowest_stability: Option<f64>,
    tiers: &TierBreakdown,
    dominant_anomaly: Option<AnomalyKind>,
    anomaly_total: u64,
    top_region: Option<&RegionContribution>,
) -> String {
    if sample_count == 0 {
        return format!(
            "Participant {} opened a session but no valid samples were recorded.",
            closed.participant_id
        );
    }

    let mut text = format!(
        "Participant {} completed a {:.0}s session ({} samples). \
         Mean stability {:.1}, lowest {:.1}.",
        closed.participant_id,
        duration_s,
        sample_count,
        mean_stability,
        lowest_stability.unwrap_or(mean_stability),
    );

    if tiers.high > 0 {
        text.push_str(&format!(
            " {} of {} samples were classified high risk.",
            tiers.high, sample_count
        ));
    } else if tiers.moderate > 0 {
        text.push_str(&format!(
            " Risk reached moderate in {} samples but never high.",
            tiers.moderate
        ));
    } else {
        text.push_str(" Risk remained low throughout.");
    }

    if let Some(kind) = dominant_anomaly {
        text.push_str(&format!(
            " {} anomalies were detected, most frequently {}.",
            anomaly_total,
            kind.as_str()
        ));
    } else {
        text.push_str(" No anomalies were detected.");
    }

    if let Some(region) = top_region {
        if region.mean_score > 0.0 {
            text.push_str(&format!(
                " Most affected region: {}.",
                region.region.display_name()
            ));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnomalyKind, CommandKind, CommandSeverity, Forecast, RawGlobalMetrics, RawSensorReading,
    };
    use chrono::Duration;
    use std::collections::HashSet;

    fn raw_frame(
        session_id: &str,
        readings: &[(&str, f64, f64, f64)],
        focus: f64,
    ) -> RawFrameRecord {
        RawFrameRecord {
            session_id: session_id.to_string(),
            participant_id: "p1".to_string(),
            global_metrics: RawGlobalMetrics { focus },
            sensors: readings
                .iter()
                .map(|(key, stress, tremor, timer)| {
                    (
                        key.to_string(),
                        RawSensorReading {
                            tremor_intensity: *tremor,
                            stress_trend: *stress,
                            stress_timer: *timer,
                            average_speed: 1.0,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        }
    }

    fn analyzer() -> SessionAnalyzer {
        SessionAnalyzer::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn rejects_frames_for_unopened_sessions() {
        let mut analyzer = analyzer();
        let err = analyzer
            .ingest(&raw_frame("ghost", &[("head", 1.0, 0.2, 0.0)], 0.9))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));
    }

    #[test]
    fn closed_sessions_stay_closed() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);
        analyzer
            .ingest_at(&raw_frame("s1", &[("head", 1.0, 0.2, 0.0)], 0.9), start)
            .unwrap();
        analyzer.close_session("s1").unwrap();

        let err = analyzer
            .ingest_at(
                &raw_frame("s1", &[("head", 1.0, 0.2, 0.0)], 0.9),
                start + Duration::seconds(1),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSession(_)));
    }

    #[test]
    fn escalating_stress_ends_high_risk_with_calming_command() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);

        // Head stress climbs steeply while the sustained-stress timer passes
        // the critical duration on the final sample.
        let mut last = None;
        for (i, (stress, timer)) in [(5.0, 0.0), (12.0, 1.5), (18.0, 3.5)].iter().enumerate() {
            let at = start + Duration::milliseconds(100 * i as i64);
            last = Some(
                analyzer
                    .ingest_at(&raw_frame("s1", &[("head", *stress, 0.5, *timer)], 0.9), at)
                    .unwrap(),
            );
        }
        let result = last.unwrap();

        assert_eq!(result.risk, RiskTier::High);
        assert!(result
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::SustainedStress));
        assert_eq!(result.command.name, CommandKind::CalmDown);
        assert_eq!(result.command.severity, CommandSeverity::Critical);
    }

    #[test]
    fn tremor_spike_flags_one_anomaly_at_most_moderate_risk() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);

        for i in 0..20u32 {
            let at = start + Duration::milliseconds(100 * i as i64);
            analyzer
                .ingest_at(&raw_frame("s1", &[("right_hand", 2.0, 0.5, 0.0)], 0.9), at)
                .unwrap();
        }
        let result = analyzer
            .ingest_at(
                &raw_frame("s1", &[("right_hand", 2.0, 9.0, 0.0)], 0.9),
                start + Duration::seconds(2),
            )
            .unwrap();

        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].kind, AnomalyKind::TremorSurge);
        assert!(result.risk.rank() <= RiskTier::Moderate.rank());
    }

    #[test]
    fn young_session_reports_neutral_cold_start() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);

        let result = analyzer
            .ingest_at(&raw_frame("s1", &[("head", 2.0, 0.5, 0.0)], 0.9), start)
            .unwrap();

        assert!(result.stability.cold_start);
        assert_eq!(result.stability.value, 50.0);
        assert_eq!(result.risk, RiskTier::Low);
        assert!(matches!(result.forecast, Forecast::InsufficientHistory { .. }));
    }

    #[test]
    fn sequence_numbers_are_monotonic_per_session() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("a", "p1", start);
        analyzer.open_session_at("b", "p2", start);

        for i in 0..5u64 {
            let at = start + Duration::milliseconds(100 * i as i64);
            let ra = analyzer
                .ingest_at(&raw_frame("a", &[("head", 1.0, 0.2, 0.0)], 0.9), at)
                .unwrap();
            assert_eq!(ra.sequence, i);
        }
        let rb = analyzer
            .ingest_at(&raw_frame("b", &[("head", 1.0, 0.2, 0.0)], 0.9), start)
            .unwrap();
        assert_eq!(rb.sequence, 0);
    }

    #[test]
    fn malformed_frame_leaves_session_state_untouched() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);
        analyzer
            .ingest_at(&raw_frame("s1", &[("head", 1.0, 0.2, 0.0)], 0.9), start)
            .unwrap();

        let bad = raw_frame("s1", &[("head", 1.0, 0.2, 0.0)], 2.5);
        assert!(analyzer.ingest_at(&bad, start).is_err());

        let next = analyzer
            .ingest_at(
                &raw_frame("s1", &[("head", 1.0, 0.2, 0.0)], 0.9),
                start + Duration::milliseconds(100),
            )
            .unwrap();
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn summary_aggregates_the_whole_session() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);

        for i in 0..20u32 {
            let at = start + Duration::milliseconds(100 * i as i64);
            analyzer
                .ingest_at(
                    &raw_frame(
                        "s1",
                        &[("head", 2.0 + (i % 3) as f64, 0.5, 0.0), ("chest", 1.0, 0.2, 0.0)],
                        0.9,
                    ),
                    at,
                )
                .unwrap();
        }
        let summary = analyzer.close_session("s1").unwrap();

        assert_eq!(summary.sample_count, 20);
        assert_eq!(
            summary.time_in_tier.low + summary.time_in_tier.moderate + summary.time_in_tier.high,
            20
        );
        assert!(summary.mean_stability > 0.0);
        assert!(summary.lowest_stability <= summary.mean_stability);
        assert!((summary.duration_s - 1.9).abs() < 0.05);
        assert_eq!(summary.participant_id, "p1");
        assert!(!summary.narrative.is_empty());
        assert_eq!(summary.top_regions.len(), 2);
    }

    #[test]
    fn summary_peak_is_the_best_per_sample_stability() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("s1", "p1", start);

        let mut best = f64::NEG_INFINITY;
        for i in 0..4u32 {
            let at = start + Duration::milliseconds(100 * i as i64);
            let result = analyzer
                .ingest_at(&raw_frame("s1", &[("head", 2.0, 0.5, 0.0)], 0.9), at)
                .unwrap();
            best = best.max(result.stability.value);
        }
        let summary = analyzer.close_session("s1").unwrap();

        assert_eq!(summary.sample_count, 4);
        assert_eq!(summary.peak_stability, best);
    }

    #[test]
    fn report_ids_are_unique() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        let mut ids = HashSet::new();
        for session in ["a", "b", "c"] {
            analyzer.open_session_at(session, "p1", start);
            analyzer
                .ingest_at(&raw_frame(session, &[("head", 1.0, 0.2, 0.0)], 0.9), start)
                .unwrap();
            ids.insert(analyzer.close_session(session).unwrap().report_id);
        }
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn idle_sessions_are_evicted_with_summaries() {
        let mut analyzer = analyzer();
        let start = Utc::now();
        analyzer.open_session_at("idle", "p1", start);
        analyzer.open_session_at("live", "p2", start);
        analyzer
            .ingest_at(&raw_frame("idle", &[("head", 1.0, 0.2, 0.0)], 0.9), start)
            .unwrap();
        let late = start + Duration::seconds(400);
        analyzer
            .ingest_at(&raw_frame("live", &[("head", 1.0, 0.2, 0.0)], 0.9), late)
            .unwrap();

        let summaries = analyzer.evict_idle(late);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, "idle");
        assert_eq!(analyzer.open_session_count(), 1);
    }
}
