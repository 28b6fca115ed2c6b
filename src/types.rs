//! Core types for the Kinesia analysis pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw wire records, validated session samples, per-sample analysis
//! results, and the end-of-session clinical summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A tracked body region. The set is closed: readings for any other key are
/// dropped at the normalization boundary, never invented as zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyRegion {
    Head,
    Chest,
    Hip,
    LeftHand,
    RightHand,
    LeftUpperArm,
    RightUpperArm,
    LeftLowerArm,
    RightLowerArm,
    LeftUpperLeg,
    RightUpperLeg,
    LeftLowerLeg,
    RightLowerLeg,
}

impl BodyRegion {
    /// All regions in canonical order. This order is the deterministic
    /// tie-break used by the region ranker.
    pub const ALL: [BodyRegion; 13] = [
        BodyRegion::Head,
        BodyRegion::Chest,
        BodyRegion::Hip,
        BodyRegion::LeftHand,
        BodyRegion::RightHand,
        BodyRegion::LeftUpperArm,
        BodyRegion::RightUpperArm,
        BodyRegion::LeftLowerArm,
        BodyRegion::RightLowerArm,
        BodyRegion::LeftUpperLeg,
        BodyRegion::RightUpperLeg,
        BodyRegion::LeftLowerLeg,
        BodyRegion::RightLowerLeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyRegion::Head => "head",
            BodyRegion::Chest => "chest",
            BodyRegion::Hip => "hip",
            BodyRegion::LeftHand => "left_hand",
            BodyRegion::RightHand => "right_hand",
            BodyRegion::LeftUpperArm => "left_upper_arm",
            BodyRegion::RightUpperArm => "right_upper_arm",
            BodyRegion::LeftLowerArm => "left_lower_arm",
            BodyRegion::RightLowerArm => "right_lower_arm",
            BodyRegion::LeftUpperLeg => "left_upper_leg",
            BodyRegion::RightUpperLeg => "right_upper_leg",
            BodyRegion::LeftLowerLeg => "left_lower_leg",
            BodyRegion::RightLowerLeg => "right_lower_leg",
        }
    }

    /// Clinical display name used in narratives and dashboards.
    pub fn display_name(&self) -> &'static str {
        match self {
            BodyRegion::Head => "Head / Cranium",
            BodyRegion::Chest => "Thorax / Chest",
            BodyRegion::Hip => "Pelvis / Hip",
            BodyRegion::LeftHand => "Left Hand",
            BodyRegion::RightHand => "Right Hand",
            BodyRegion::LeftUpperArm => "L. Proximal Arm",
            BodyRegion::RightUpperArm => "R. Proximal Arm",
            BodyRegion::LeftLowerArm => "L. Forearm",
            BodyRegion::RightLowerArm => "R. Forearm",
            BodyRegion::LeftUpperLeg => "L. Proximal Leg",
            BodyRegion::RightUpperLeg => "R. Proximal Leg",
            BodyRegion::LeftLowerLeg => "L. Distal Leg",
            BodyRegion::RightLowerLeg => "R. Distal Leg",
        }
    }

    /// Parse a wire key into a region. Returns `None` for unknown keys.
    pub fn from_key(key: &str) -> Option<BodyRegion> {
        BodyRegion::ALL.iter().copied().find(|r| r.as_str() == key)
    }

    /// Position in canonical order, for stable sorting.
    pub fn ordinal(&self) -> usize {
        BodyRegion::ALL.iter().position(|r| r == self).unwrap_or(0)
    }
}

/// 3D orientation in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub roll: f64,
}

/// One raw per-region reading as received on the wire, before validation.
///
/// Field aliases accept the legacy engine payload names (`rotation`,
/// `delta_rotation`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSensorReading {
    #[serde(default)]
    pub tremor_intensity: f64,
    #[serde(default)]
    pub stress_trend: f64,
    #[serde(default)]
    pub stress_timer: f64,
    #[serde(default, alias = "rotation")]
    pub orientation: Orientation,
    #[serde(default, alias = "delta_rotation")]
    pub delta_orientation: Orientation,
    #[serde(default)]
    pub average_speed: f64,
}

/// Raw session-wide metrics as received on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGlobalMetrics {
    /// Attention/focus proxy in [0,1] (gaze-target alignment)
    #[serde(default = "default_focus", alias = "hmd_eye_dot_product")]
    pub focus: f64,
}

fn default_focus() -> f64 {
    1.0
}

impl Default for RawGlobalMetrics {
    fn default() -> Self {
        Self { focus: 1.0 }
    }
}

/// One raw frame record as delivered by the ingestion boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFrameRecord {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, alias = "patient_id")]
    pub participant_id: String,
    #[serde(default)]
    pub global_metrics: RawGlobalMetrics,
    #[serde(default)]
    pub sensors: HashMap<String, RawSensorReading>,
}

/// One validated reading for one body region at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Tremor intensity (non-negative, raw sensor scale)
    pub tremor_intensity: f64,
    /// Stress trend (raw sensor scale)
    pub stress_trend: f64,
    /// Seconds of sustained elevated stress, engine-authoritative
    pub stress_timer: f64,
    pub orientation: Orientation,
    pub delta_orientation: Orientation,
    /// Average linear speed (non-negative)
    pub average_speed: f64,
}

/// Validated session-wide instantaneous metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    /// Attention/focus proxy in [0,1]
    pub focus: f64,
}

/// One validated, timestamped bundle of region readings plus global metrics.
/// Immutable once created; a region absent from `regions` is unreported,
/// never zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSample {
    pub session_id: String,
    pub participant_id: String,
    /// Store-assigned monotonic sequence number within the session
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub regions: HashMap<BodyRegion, SensorFrame>,
    pub metrics: GlobalMetrics,
}

/// Discrete risk tier driving intervention commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Moderate => "moderate",
            RiskTier::High => "high",
        }
    }

    /// Severity rank; ties between rules break toward the higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            RiskTier::Low => 0,
            RiskTier::Moderate => 1,
            RiskTier::High => 2,
        }
    }
}

/// Composite 0-100 steadiness score, higher = more stable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityIndex {
    pub value: f64,
    /// True when the rolling window was too short for reliable statistics
    /// and the neutral mid-range value was returned instead.
    pub cold_start: bool,
}

/// Direction of the fitted stress trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Short-horizon stress forecast. `InsufficientHistory` is an explicit
/// partial-result state, not an error: consumers must be able to tell a
/// projection from "could not compute".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Forecast {
    Projection {
        horizon_s: u32,
        /// Point estimate on the raw stress scale, never negative
        projected_stress: f64,
        /// 80% prediction interval
        lower_bound: f64,
        upper_bound: f64,
        r_squared: f64,
        direction: TrendDirection,
        samples_used: usize,
    },
    InsufficientHistory {
        samples_seen: usize,
        required: usize,
    },
}

impl Forecast {
    pub fn is_available(&self) -> bool {
        matches!(self, Forecast::Projection { .. })
    }
}

/// Kind of detected anomaly. Extensible: new kinds are additive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    StressSpike,
    TremorSurge,
    FocusDrop,
    SustainedStress,
    /// Simultaneous stress elevation across most reported regions; carries
    /// no region of its own.
    CorrelatedElevation,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::StressSpike => "stress_spike",
            AnomalyKind::TremorSurge => "tremor_surge",
            AnomalyKind::FocusDrop => "focus_drop",
            AnomalyKind::SustainedStress => "sustained_stress",
            AnomalyKind::CorrelatedElevation => "correlated_elevation",
        }
    }
}

/// Tiered anomaly severity. Tiers rather than a continuous score keep the
/// output stable for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Mild,
    Marked,
    Severe,
    Critical,
}

impl AnomalySeverity {
    pub fn rank(&self) -> u8 {
        match self {
            AnomalySeverity::Mild => 1,
            AnomalySeverity::Marked => 2,
            AnomalySeverity::Severe => 3,
            AnomalySeverity::Critical => 4,
        }
    }
}

/// One detected anomalous condition, relative to the session's own recent
/// distribution. `region: None` means session-global (focus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub region: Option<BodyRegion>,
    pub severity: AnomalySeverity,
    /// Raw deviation measure for audit (standard score, clamped)
    pub z_score: f64,
    pub observed: f64,
    pub baseline: f64,
}

/// Per-region distress contribution produced by the region ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionScore {
    pub region: BodyRegion,
    /// Composite contribution in [0,1], descending in ranker output
    pub score: f64,
    pub stress_component: f64,
    pub tremor_component: f64,
}

/// Downstream actuation command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Continue,
    Monitor,
    SlowDown,
    PauseAndBreathe,
    CalmDown,
    Disengage,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Continue => "continue",
            CommandKind::Monitor => "monitor",
            CommandKind::SlowDown => "slow_down",
            CommandKind::PauseAndBreathe => "pause_and_breathe",
            CommandKind::CalmDown => "calm_down",
            CommandKind::Disengage => "disengage",
        }
    }
}

/// Severity attached to an intervention command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured command emitted per accepted sample for downstream actuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionCommand {
    pub name: CommandKind,
    pub target_region: Option<BodyRegion>,
    pub reason: String,
    pub severity: CommandSeverity,
}

/// Derived, immutable analysis snapshot for one accepted sample.
///
/// The shape is always complete: stages that could not compute are marked
/// explicitly (`Forecast::InsufficientHistory`, `StabilityIndex::cold_start`)
/// rather than omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub session_id: String,
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub stability: StabilityIndex,
    pub risk: RiskTier,
    pub forecast: Forecast,
    pub anomalies: Vec<Anomaly>,
    /// Regions ordered by distress contribution, descending
    pub ranked_regions: Vec<RegionScore>,
    /// Trustworthiness of this result in [0,1], from data quality only
    pub confidence: f64,
    pub command: InterventionCommand,
}

/// Sample counts spent in each risk tier over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub low: u64,
    pub moderate: u64,
    pub high: u64,
}

/// Aggregate contribution of one region over a whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionContribution {
    pub region: BodyRegion,
    /// Mean ranker score across the samples in which the region reported
    pub mean_score: f64,
    pub peak_stress: f64,
    pub peak_tremor: f64,
}

/// Aggregate clinical summary built once at session close from the sequence
/// of per-sample analysis results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub report_id: Uuid,
    pub session_id: String,
    pub participant_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_s: f64,
    pub sample_count: u64,
    pub mean_stability: f64,
    /// Best (highest) stability observed during the session
    pub peak_stability: f64,
    /// Worst (lowest) stability observed during the session
    pub lowest_stability: f64,
    pub time_in_tier: TierBreakdown,
    pub anomaly_counts: HashMap<AnomalyKind, u64>,
    pub dominant_anomaly: Option<AnomalyKind>,
    /// Regions ordered by overall session contribution, descending
    pub top_regions: Vec<RegionContribution>,
    pub narrative: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_keys_round_trip() {
        for region in BodyRegion::ALL {
            assert_eq!(BodyRegion::from_key(region.as_str()), Some(region));
        }
        assert_eq!(BodyRegion::from_key("tail"), None);
    }

    #[test]
    fn region_ordinal_matches_canonical_order() {
        for (i, region) in BodyRegion::ALL.iter().enumerate() {
            assert_eq!(region.ordinal(), i);
        }
    }

    #[test]
    fn raw_reading_accepts_legacy_field_names() {
        let json = r#"{
            "tremor_intensity": 1.5,
            "stress_trend": 4.0,
            "stress_timer": 0.5,
            "rotation": {"pitch": 10.0, "yaw": -5.0, "roll": 0.0},
            "delta_rotation": {"pitch": 0.1, "yaw": 0.2, "roll": 0.0},
            "average_speed": 2.0
        }"#;
        let reading: RawSensorReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.orientation.pitch, 10.0);
        assert_eq!(reading.delta_orientation.yaw, 0.2);
    }

    #[test]
    fn raw_metrics_accept_legacy_focus_name() {
        let metrics: RawGlobalMetrics =
            serde_json::from_str(r#"{"hmd_eye_dot_product": 0.82}"#).unwrap();
        assert_eq!(metrics.focus, 0.82);

        let defaulted: RawGlobalMetrics = serde_json::from_str("{}").unwrap();
        assert_eq!(defaulted.focus, 1.0);
    }

    #[test]
    fn forecast_serializes_with_status_tag() {
        let forecast = Forecast::InsufficientHistory {
            samples_seen: 3,
            required: 10,
        };
        let json = serde_json::to_value(&forecast).unwrap();
        assert_eq!(json["status"], "insufficient_history");
        assert_eq!(json["samples_seen"], 3);
    }

    #[test]
    fn tier_rank_orders_severity() {
        assert!(RiskTier::High.rank() > RiskTier::Moderate.rank());
        assert!(RiskTier::Moderate.rank() > RiskTier::Low.rank());
    }
}
