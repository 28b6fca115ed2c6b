//! Predictive stress forecasting
//!
//! Fits a low-order trend over the most recent aggregate stress observations
//! and projects it to a configurable horizon. The point estimate blends a
//! linear OLS extrapolation with a damped EWMA momentum term, weighted by the
//! fit's R². The 80% prediction interval derives from the residual RMSD of
//! the fit and widens with fewer data points, higher residual variance, and
//! longer horizons.
//!
//! The forecast is advisory only: risk classification uses observed values,
//! never projected ones.

use crate::config::EngineConfig;
use crate::stats;
use crate::types::{Forecast, TrendDirection};
use crate::window::SessionSnapshot;
use std::collections::HashMap;

/// z-score for an 80% prediction interval
const PI_Z: f64 = 1.282;

/// Slope magnitude (units per sample) below which the trend reads as stable
const STABLE_SLOPE: f64 = 0.02;

/// Damping applied to the EWMA momentum extrapolation
const MOMENTUM_DAMPING: f64 = 0.7;

/// Per-session stress forecaster. Holds only the EWMA momentum state; all
/// statistics come from the immutable session snapshot.
#[derive(Debug, Default)]
pub struct StressForecaster {
    momentum: HashMap<String, f64>,
}

impl StressForecaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a forecast for the session's aggregate stress series.
    ///
    /// Below `forecast_min_points` observations this returns the explicit
    /// `InsufficientHistory` state rather than an unstable extrapolation.
    pub fn forecast(
        &mut self,
        session_id: &str,
        snapshot: &SessionSnapshot,
        config: &EngineConfig,
    ) -> Forecast {
        let series = &snapshot.stress_series;
        let n = series.len();
        if n < config.forecast_min_points {
            return Forecast::InsufficientHistory {
                samples_seen: n,
                required: config.forecast_min_points,
            };
        }

        let current = series[n - 1];
        let (slope, r_squared) = stats::trend_slope(series);
        let rmsd = stats::residual_rmsd(series);

        let horizon_s = config.forecast_horizon_s;
        let horizon_samples = horizon_s as f64 / config.expected_frame_interval_s;

        // Linear extrapolation from the latest observation
        let linear_pred = (current + slope * horizon_samples).max(0.0);

        // EWMA momentum with adaptive smoothing: faster when the trend is
        // pronounced
        let alpha = (slope.abs() * 0.5 + 0.1).clamp(0.1, 0.4);
        let prev = *self.momentum.get(session_id).unwrap_or(&current);
        let ewma = stats::ewma_step(current, prev, alpha);
        self.momentum.insert(session_id.to_string(), ewma);
        let ewma_pred = (ewma + slope * horizon_samples * MOMENTUM_DAMPING).max(0.0);

        // Blend weighted by how informative the linear fit is
        let w_linear = if r_squared > 0.3 {
            0.6 + 0.4 * r_squared
        } else {
            0.4
        };
        let projected = (w_linear * linear_pred + (1.0 - w_linear) * ewma_pred).max(0.0);

        // Interval widens with noise, sparse history, and distance ahead
        let sample_factor = 1.0 + 1.0 / (n as f64).sqrt();
        let horizon_factor = (1.0 + horizon_s as f64 / 60.0).sqrt();
        let half_width = PI_Z * rmsd * sample_factor * horizon_factor;

        let direction = if slope > STABLE_SLOPE {
            TrendDirection::Rising
        } else if slope < -STABLE_SLOPE {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        };

        Forecast::Projection {
            horizon_s,
            projected_stress: projected,
            lower_bound: (projected - half_width).max(0.0),
            upper_bound: projected + half_width,
            r_squared,
            direction,
            samples_used: n,
        }
    }

    /// Drop momentum state for a closed session.
    pub fn forget(&mut self, session_id: &str) {
        self.momentum.remove(session_id);
    }
}
