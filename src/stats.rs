//! Shared statistical helpers
//!
//! Small numeric routines used across the analyzers: clamped standard
//! scores, least-squares trend fitting, and single-step exponential
//! smoothing. All are pure functions over in-memory slices.

/// Standard scores are clamped to this magnitude so signal spikes cannot
/// produce unbounded outputs.
pub const Z_CLAMP: f64 = 6.0;

const EPSILON: f64 = 1e-9;

/// Standard z-score: how many standard deviations `value` lies from `mean`.
/// Returns 0.0 when the deviation is effectively zero (no variation in the
/// signal) and clamps the result to [-Z_CLAMP, Z_CLAMP].
pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    if std < EPSILON {
        return 0.0;
    }
    ((value - mean) / std).clamp(-Z_CLAMP, Z_CLAMP)
}

/// Ordinary least-squares linear fit over `values` with implicit x = 0,1,2,…
///
/// Returns `(slope, r_squared)`. Slope is in units per step. With fewer than
/// three points, or a degenerate x spread, returns `(0.0, 0.0)`.
pub fn trend_slope(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 3 {
        return (0.0, 0.0);
    }
    let nf = n as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denom = nf * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-12 {
        return (0.0, 0.0);
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / nf;

    let y_mean = sum_y / nf;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let fitted = slope * (i as f64) + intercept;
        ss_tot += (y - y_mean) * (y - y_mean);
        ss_res += (y - fitted) * (y - fitted);
    }

    let r_squared = if ss_tot < 1e-12 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).max(0.0)
    };

    (slope, r_squared)
}

/// Root-mean-square deviation of `values` from their OLS fit. Used to derive
/// forecast prediction intervals.
pub fn residual_rmsd(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let (slope, _) = trend_slope(values);
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    // Intercept of the OLS line through (mean x, mean y)
    let intercept = mean - slope * (nf - 1.0) / 2.0;

    let ss: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| {
            let r = y - (slope * i as f64 + intercept);
            r * r
        })
        .sum();
    (ss / nf).sqrt()
}

/// Single-step exponential weighted moving average update.
pub fn ewma_step(value: f64, prev: f64, alpha: f64) -> f64 {
    alpha * value + (1.0 - alpha) * prev
}
