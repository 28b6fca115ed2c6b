//! Engine configuration
//!
//! All thresholds and window sizes used by the analyzers are supplied here at
//! startup; nothing is mutated at runtime. `validate()` fails fast with
//! [`EngineError::InvalidConfig`] before any frame is processed.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Allowed forecast horizon range in seconds
pub const HORIZON_MIN_S: u32 = 30;
pub const HORIZON_MAX_S: u32 = 600;

/// Thresholds and window sizes for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stability below this is tier HIGH
    pub stability_high_cutoff: f64,
    /// Stability below this is tier MODERATE
    pub stability_moderate_cutoff: f64,
    /// Stress trend at or above this is critical
    pub stress_trend_critical: f64,
    /// Stress trend at or above this is elevated
    pub stress_trend_elevated: f64,
    /// Seconds of sustained critical stress before tier HIGH
    pub stress_timer_critical: f64,
    /// Standard-deviation multiplier for statistical anomalies
    pub anomaly_sigma: f64,
    /// Absolute deviation floor used when the rolling variance is degenerate
    /// (a flat baseline still must flag a large jump)
    pub spike_min_delta: f64,
    /// Fraction of reported regions that must sit above their own baseline
    /// at once for a correlated-elevation anomaly
    pub correlated_region_fraction: f64,
    /// Minimum window samples before stability and statistical anomaly
    /// estimates are considered meaningful (cold-start guard)
    pub min_history_samples: usize,
    /// Minimum observations before the forecaster produces a projection
    pub forecast_min_points: usize,
    /// Forecast horizon in seconds
    pub forecast_horizon_s: u32,
    /// Number of most-recent observations used for slope-of-last-K
    pub trend_window: usize,
    /// Per-metric rolling window capacity in samples
    pub window_capacity: usize,
    /// Sessions with no samples for this long are evicted
    pub idle_timeout_s: u64,
    /// Expected seconds between frames, used by the staleness penalty
    pub expected_frame_interval_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stability_high_cutoff: 25.0,
            stability_moderate_cutoff: 45.0,
            stress_trend_critical: 15.0,
            stress_trend_elevated: 10.0,
            stress_timer_critical: 3.0,
            anomaly_sigma: 2.5,
            spike_min_delta: 3.0,
            correlated_region_fraction: 0.65,
            min_history_samples: 5,
            forecast_min_points: 10,
            forecast_horizon_s: 120,
            trend_window: 30,
            window_capacity: 120,
            idle_timeout_s: 300,
            expected_frame_interval_s: 0.1,
        }
    }
}

impl EngineConfig {
    /// Validate threshold ordering and ranges.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.stability_high_cutoff.is_finite() || !self.stability_moderate_cutoff.is_finite() {
            return Err(EngineError::InvalidConfig(
                "stability cutoffs must be finite".to_string(),
            ));
        }
        if self.stability_high_cutoff < 0.0 || self.stability_moderate_cutoff > 100.0 {
            return Err(EngineError::InvalidConfig(
                "stability cutoffs must lie in [0, 100]".to_string(),
            ));
        }
        if self.stability_high_cutoff >= self.stability_moderate_cutoff {
            return Err(EngineError::InvalidConfig(format!(
                "stability_high_cutoff ({}) must be below stability_moderate_cutoff ({})",
                self.stability_high_cutoff, self.stability_moderate_cutoff
            )));
        }
        if self.stress_trend_elevated < 0.0
            || self.stress_trend_elevated >= self.stress_trend_critical
        {
            return Err(EngineError::InvalidConfig(format!(
                "stress_trend_elevated ({}) must be non-negative and below stress_trend_critical ({})",
                self.stress_trend_elevated, self.stress_trend_critical
            )));
        }
        if self.stress_timer_critical < 0.0 || !self.stress_timer_critical.is_finite() {
            return Err(EngineError::InvalidConfig(
                "stress_timer_critical must be a non-negative finite value".to_string(),
            ));
        }
        if self.anomaly_sigma <= 0.0 || !self.anomaly_sigma.is_finite() {
            return Err(EngineError::InvalidConfig(
                "anomaly_sigma must be positive".to_string(),
            ));
        }
        if self.spike_min_delta <= 0.0 || !self.spike_min_delta.is_finite() {
            return Err(EngineError::InvalidConfig(
                "spike_min_delta must be positive".to_string(),
            ));
        }
        if self.correlated_region_fraction <= 0.0 || self.correlated_region_fraction > 1.0 {
            return Err(EngineError::InvalidConfig(
                "correlated_region_fraction must lie in (0, 1]".to_string(),
            ));
        }
        if self.min_history_samples < 2 {
            return Err(EngineError::InvalidConfig(
                "min_history_samples must be at least 2".to_string(),
            ));
        }
        if self.forecast_min_points < 3 {
            return Err(EngineError::InvalidConfig(
                "forecast_min_points must be at least 3 for a regression fit".to_string(),
            ));
        }
        if self.forecast_horizon_s < HORIZON_MIN_S || self.forecast_horizon_s > HORIZON_MAX_S {
            return Err(EngineError::InvalidConfig(format!(
                "forecast_horizon_s ({}) must lie in [{}, {}]",
                self.forecast_horizon_s, HORIZON_MIN_S, HORIZON_MAX_S
            )));
        }
        if self.trend_window < 3 {
            return Err(EngineError::InvalidConfig(
                "trend_window must be at least 3".to_string(),
            ));
        }
        if self.window_capacity < 8 {
            return Err(EngineError::InvalidConfig(
                "window_capacity must be at least 8".to_string(),
            ));
        }
        if self.expected_frame_interval_s <= 0.0 || !self.expected_frame_interval_s.is_finite() {
            return Err(EngineError::InvalidConfig(
                "expected_frame_interval_s must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
