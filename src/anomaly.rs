//! Statistical anomaly detection
//!
//! Flags values that deviate from the session's own recent distribution:
//! stress spikes and tremor surges per region, focus drops and correlated
//! multi-region elevation globally, and sustained critical stress driven by
//! the engine-authoritative stress timer. Deviations are scored against the
//! window as it stood before the current value arrived; a value never sits
//! inside its own baseline. Statistical detectors share the cold-start guard
//! with the stability index; the sustained detector works from absolute
//! thresholds and therefore fires even on young sessions.
//!
//! Severity tiers follow clinical signal-processing conventions:
//! |z| >= 2.0 mild, >= 2.5 marked, >= 3.0 severe, >= 4.0 critical.

use crate::config::EngineConfig;
use crate::stats::{self, Z_CLAMP};
use crate::types::{Anomaly, AnomalyKind, AnomalySeverity, BodyRegion, SessionSample};
use crate::window::{SessionSnapshot, WindowSnapshot};
use std::collections::HashMap;

const MARKED_Z: f64 = 2.5;
const SEVERE_Z: f64 = 3.0;
const CRITICAL_Z: f64 = 4.0;

const STD_EPSILON: f64 = 1e-9;

/// Elevation ratio thresholds for the correlated multi-region detector
const CORRELATION_SEVERE: f64 = 0.75;
const CORRELATION_CRITICAL: f64 = 0.85;
/// Rescales the elevation ratio onto the z ladder for reporting
const CORRELATION_SCORE_SCALE: f64 = 5.0;

/// Anomaly detector over one sample and its post-append snapshot
pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Detect all anomalies in `sample`. Multiple anomalies may co-occur;
    /// the result is deduplicated per (region, kind) keeping the highest
    /// severity, then sorted severity-descending with canonical region order
    /// as the tie-break.
    pub fn detect(
        sample: &SessionSample,
        snapshot: &SessionSnapshot,
        config: &EngineConfig,
    ) -> Vec<Anomaly> {
        let mut events: Vec<Anomaly> = Vec::new();
        // The snapshot already includes the current sample, so warm-up
        // requires min_history_samples of history before it.
        let warmed_up = snapshot.sample_count > config.min_history_samples as u64;

        for (region, frame) in &sample.regions {
            let region_snapshot = match snapshot.regions.get(region) {
                Some(s) => s,
                None => continue,
            };

            // A region that joined the session late keeps its own warm-up
            // clock; the session count alone is not enough.
            if warmed_up && region_snapshot.stress.count > config.min_history_samples {
                if let Some(event) = deviation_event(
                    frame.stress_trend,
                    &region_snapshot.stress,
                    AnomalyKind::StressSpike,
                    Some(*region),
                    config,
                ) {
                    events.push(event);
                }
                if let Some(event) = deviation_event(
                    frame.tremor_intensity,
                    &region_snapshot.tremor,
                    AnomalyKind::TremorSurge,
                    Some(*region),
                    config,
                ) {
                    events.push(event);
                }
            }

            // Sustained elevation uses absolute clinical thresholds, so it
            // needs no statistical warm-up.
            if frame.stress_trend >= config.stress_trend_critical
                && frame.stress_timer >= config.stress_timer_critical
            {
                let (mean, std) = region_snapshot
                    .stress
                    .baseline()
                    .unwrap_or((frame.stress_trend, 0.0));
                events.push(Anomaly {
                    kind: AnomalyKind::SustainedStress,
                    region: Some(*region),
                    severity: AnomalySeverity::Critical,
                    z_score: stats::z_score(frame.stress_trend, mean, std),
                    observed: frame.stress_trend,
                    baseline: config.stress_trend_critical,
                });
            }
        }

        // Focus is session-global; a drop is a deviation below baseline.
        if warmed_up {
            if let Some((mean, std)) = snapshot.focus.baseline() {
                let focus = sample.metrics.focus;
                let z = stats::z_score(focus, mean, std);
                if std >= STD_EPSILON && z <= -config.anomaly_sigma {
                    events.push(Anomaly {
                        kind: AnomalyKind::FocusDrop,
                        region: None,
                        severity: severity_for(z.abs()),
                        z_score: z,
                        observed: focus,
                        baseline: mean,
                    });
                }
            }

            if let Some(event) = correlated_elevation(sample, snapshot, config) {
                events.push(event);
            }
        }

        dedup_and_rank(events)
    }
}

/// Upward deviation check for one metric against the rolling window as it
/// stood before `value` was appended.
///
/// With a degenerate (flat) baseline the standard score is undefined, so an
/// absolute jump of at least `spike_min_delta` still flags, scored at the
/// clamp ceiling.
fn deviation_event(
    value: f64,
    window: &WindowSnapshot,
    kind: AnomalyKind,
    region: Option<BodyRegion>,
    config: &EngineConfig,
) -> Option<Anomaly> {
    let (mean, std) = window.baseline()?;
    let (z, severity) = if std >= STD_EPSILON {
        let z = stats::z_score(value, mean, std);
        if z < config.anomaly_sigma {
            return None;
        }
        (z, severity_for(z))
    } else {
        let delta = value - mean;
        if delta < config.spike_min_delta {
            return None;
        }
        (Z_CLAMP, AnomalySeverity::Critical)
    };

    Some(Anomaly {
        kind,
        region,
        severity,
        z_score: z,
        observed: value,
        baseline: mean,
    })
}

/// Simultaneous elevation across most reported regions, a global arousal
/// pattern no single-region detector can see. A region counts as elevated
/// when its stress exceeds its own baseline mean by one standard deviation.
fn correlated_elevation(
    sample: &SessionSample,
    snapshot: &SessionSnapshot,
    config: &EngineConfig,
) -> Option<Anomaly> {
    let mut reported = 0usize;
    let mut elevated = 0usize;
    for (region, frame) in &sample.regions {
        let (mean, std) = match snapshot.regions.get(region).and_then(|s| s.stress.baseline()) {
            Some(b) => b,
            None => continue,
        };
        reported += 1;
        if frame.stress_trend > mean + std {
            elevated += 1;
        }
    }
    // One region cannot corroborate a cross-region pattern.
    if reported < 2 {
        return None;
    }

    let ratio = elevated as f64 / reported as f64;
    if ratio < config.correlated_region_fraction {
        return None;
    }

    let severity = if ratio >= CORRELATION_CRITICAL {
        AnomalySeverity::Critical
    } else if ratio >= CORRELATION_SEVERE {
        AnomalySeverity::Severe
    } else {
        AnomalySeverity::Marked
    };
    Some(Anomaly {
        kind: AnomalyKind::CorrelatedElevation,
        region: None,
        severity,
        z_score: ratio * CORRELATION_SCORE_SCALE,
        observed: ratio,
        baseline: config.correlated_region_fraction,
    })
}

fn severity_for(abs_z: f64) -> AnomalySeverity {
    if abs_z >= CRITICAL_Z {
        AnomalySeverity::Critical
    } else if abs_z >= SEVERE_Z {
        AnomalySeverity::Severe
    } else if abs_z >= MARKED_Z {
        AnomalySeverity::Marked
    } else {
        AnomalySeverity::Mild
    }
}

/// Keep the highest severity per (region, kind), then order by severity
/// descending with canonical region order (global last) as tie-break.
fn dedup_and_rank(events: Vec<Anomaly>) -> Vec<Anomaly> {
    let mut best: HashMap<(Option<BodyRegion>, AnomalyKind), Anomaly> = HashMap::new();
    for event in events {
        let key = (event.region, event.kind);
        match best.get(&key) {
            Some(existing) if existing.severity.rank() >= event.severity.rank() => {}
            _ => {
                best.insert(key, event);
            }
        }
    }

    let mut ranked: Vec<Anomaly> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| region_order(a.region).cmp(&region_order(b.region)))
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });
    ranked
}

fn region_order(region: Option<BodyRegion>) -> usize {
    region.map(|r| r.ordinal()).unwrap_or(usize::MAX)
}
