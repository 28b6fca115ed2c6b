//! Frame normalization
//!
//! This module validates and canonicalizes one raw frame record into an
//! immutable [`SessionSample`]:
//! - numeric fields must be finite and within physically plausible bounds
//! - unknown region keys are dropped with a logged warning, not a hard failure
//! - a missing session id rejects the whole frame
//!
//! Normalization is pure: it never touches session state.

use crate::error::EngineError;
use crate::types::{
    BodyRegion, GlobalMetrics, Orientation, RawFrameRecord, RawSensorReading, SensorFrame,
    SessionSample,
};
use chrono::{DateTime, Utc};
use log::warn;
use std::collections::HashMap;

/// Normalizer for converting raw frame records to session samples
pub struct FrameNormalizer;

impl FrameNormalizer {
    /// Validate `raw` and produce a sample timestamped at `taken_at`.
    ///
    /// The sequence number is assigned later by the session store; the sample
    /// leaves here with sequence 0.
    pub fn normalize(
        raw: &RawFrameRecord,
        taken_at: DateTime<Utc>,
    ) -> Result<SessionSample, EngineError> {
        if raw.session_id.trim().is_empty() {
            return Err(EngineError::MalformedFrame(
                "missing session_id".to_string(),
            ));
        }

        let focus = raw.global_metrics.focus;
        if !focus.is_finite() || !(0.0..=1.0).contains(&focus) {
            return Err(EngineError::OutOfRangeValue {
                field: "global_metrics.focus",
                value: focus,
            });
        }

        let mut regions: HashMap<BodyRegion, SensorFrame> = HashMap::new();
        for (key, reading) in &raw.sensors {
            let region = match BodyRegion::from_key(key) {
                Some(region) => region,
                None => {
                    warn!(
                        "dropping unknown region '{}' in session {}",
                        key, raw.session_id
                    );
                    continue;
                }
            };
            regions.insert(region, validate_reading(reading)?);
        }

        Ok(SessionSample {
            session_id: raw.session_id.clone(),
            participant_id: raw.participant_id.clone(),
            sequence: 0,
            taken_at,
            regions,
            metrics: GlobalMetrics { focus },
        })
    }
}

fn validate_reading(reading: &RawSensorReading) -> Result<SensorFrame, EngineError> {
    check_non_negative("tremor_intensity", reading.tremor_intensity)?;
    check_finite("stress_trend", reading.stress_trend)?;
    check_non_negative("stress_timer", reading.stress_timer)?;
    check_non_negative("average_speed", reading.average_speed)?;
    check_orientation("orientation", &reading.orientation)?;
    check_orientation("delta_orientation", &reading.delta_orientation)?;

    Ok(SensorFrame {
        tremor_intensity: reading.tremor_intensity,
        stress_trend: reading.stress_trend,
        stress_timer: reading.stress_timer,
        orientation: reading.orientation,
        delta_orientation: reading.delta_orientation,
        average_speed: reading.average_speed,
    })
}

fn check_finite(field: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::OutOfRangeValue { field, value })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EngineError::OutOfRangeValue { field, value })
    }
}

fn check_orientation(field: &'static str, orientation: &Orientation) -> Result<(), EngineError> {
    for angle in [orientation.pitch, orientation.yaw, orientation.roll] {
        check_finite(field, angle)?;
    }
    Ok(())
}
