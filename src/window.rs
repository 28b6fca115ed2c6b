//! Rolling session state
//!
//! Per-session bounded history and running statistics, the only mutable
//! shared state in the engine. Each metric lives in a fixed-capacity
//! [`RollingWindow`] with Welford online mean/variance, so estimates stay
//! numerically stable even at low signal amplitude. Analyzer stages never
//! read these buffers directly: the single writer takes an owned
//! [`SessionSnapshot`] right after appending, and all stages read that.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::stats;
use crate::types::{BodyRegion, SensorFrame, SessionSample};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// EMA smoothing factor for per-region stress/tremor. Slow smoothing keeps
/// the clinical output stable frame to frame.
const EMA_ALPHA: f64 = 0.15;

/// Fixed-capacity ring buffer with O(1) push and online mean/variance.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    data: VecDeque<f64>,
    count: usize,
    mean: f64,
    m2: f64,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 2);
        Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
            count: 0,
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Append a new observation, evicting the oldest when full.
    pub fn push(&mut self, value: f64) {
        if self.count == self.capacity {
            self.remove_oldest();
        }
        self.data.push_back(value);

        // Welford update
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Remove the oldest value and reverse the Welford state.
    fn remove_oldest(&mut self) {
        let old = match self.data.pop_front() {
            Some(v) => v,
            None => return,
        };
        let n = self.count as f64;
        let old_mean = if self.count > 1 {
            (self.mean * n - old) / (n - 1.0)
        } else {
            0.0
        };
        self.m2 -= (old - self.mean) * (old - old_mean);
        // Numerical guard against cancellation drift
        self.m2 = self.m2.max(0.0);
        self.mean = old_mean;
        self.count -= 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count > 0 {
            self.mean
        } else {
            0.0
        }
    }

    /// Sample variance (n-1 denominator).
    pub fn variance(&self) -> f64 {
        if self.count >= 2 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        }
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// The `k` most recent values, oldest first.
    pub fn last_k(&self, k: usize) -> Vec<f64> {
        let skip = self.data.len().saturating_sub(k);
        self.data.iter().skip(skip).copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Read-only statistical view with slope over the last `trend_window`
    /// observations.
    pub fn snapshot(&self, trend_window: usize) -> WindowSnapshot {
        let (slope, r_squared) = stats::trend_slope(&self.last_k(trend_window));
        WindowSnapshot {
            count: self.count,
            mean: self.mean(),
            std: self.std(),
            min: if self.count > 0 { self.min() } else { 0.0 },
            max: if self.count > 0 { self.max() } else { 0.0 },
            last: self.last(),
            slope,
            r_squared,
        }
    }
}

/// Immutable statistics for one metric window at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub last: Option<f64>,
    /// OLS slope over the last K observations, units per sample
    pub slope: f64,
    pub r_squared: f64,
}

impl WindowSnapshot {
    /// Mean and std of the window with its most recent value removed,
    /// reversing the Welford update. A value must not sit inside the
    /// baseline it is scored against. None with fewer than two values.
    pub fn baseline(&self) -> Option<(f64, f64)> {
        let last = self.last?;
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        let prev_mean = (self.mean * n - last) / (n - 1.0);
        let m2 = self.std * self.std * (n - 1.0);
        let prev_m2 = (m2 - (last - self.mean) * (last - prev_mean)).max(0.0);
        let prev_std = if self.count > 2 {
            (prev_m2 / (n - 2.0)).sqrt()
        } else {
            0.0
        };
        Some((prev_mean, prev_std))
    }
}

/// Rolling statistics for one body region within a session.
#[derive(Debug, Clone)]
struct RegionState {
    stress: RollingWindow,
    tremor: RollingWindow,
    ema_stress: f64,
    ema_tremor: f64,
    peak_stress: f64,
    peak_tremor: f64,
}

impl RegionState {
    fn new(capacity: usize) -> Self {
        Self {
            stress: RollingWindow::new(capacity),
            tremor: RollingWindow::new(capacity),
            ema_stress: 0.0,
            ema_tremor: 0.0,
            peak_stress: 0.0,
            peak_tremor: 0.0,
        }
    }

    fn update(&mut self, frame: &SensorFrame) {
        // EMA seeds from the first observation instead of decaying up from 0
        if self.stress.count() == 0 {
            self.ema_stress = frame.stress_trend;
            self.ema_tremor = frame.tremor_intensity;
        } else {
            self.ema_stress = stats::ewma_step(frame.stress_trend, self.ema_stress, EMA_ALPHA);
            self.ema_tremor = stats::ewma_step(frame.tremor_intensity, self.ema_tremor, EMA_ALPHA);
        }
        self.stress.push(frame.stress_trend);
        self.tremor.push(frame.tremor_intensity);
        self.peak_stress = self.peak_stress.max(frame.stress_trend);
        self.peak_tremor = self.peak_tremor.max(frame.tremor_intensity);
    }
}

/// Immutable per-region view handed to the analyzer stages.
#[derive(Debug, Clone)]
pub struct RegionSnapshot {
    pub stress: WindowSnapshot,
    pub tremor: WindowSnapshot,
    pub ema_stress: f64,
    pub ema_tremor: f64,
    pub peak_stress: f64,
    pub peak_tremor: f64,
}

/// Immutable whole-session view taken right after an append. Stages 3-8 all
/// read from this value, so none can observe a half-updated buffer.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub sample_count: u64,
    pub regions: HashMap<BodyRegion, RegionSnapshot>,
    pub focus: WindowSnapshot,
    /// Per-sample mean stress across reported regions
    pub aggregate_stress: WindowSnapshot,
    /// Recent aggregate stress values, oldest first, for the forecaster fit
    pub stress_series: Vec<f64>,
    /// Seconds between the two most recent samples, if two exist
    pub last_gap_s: Option<f64>,
}

/// Mutable state for one open session.
#[derive(Debug, Clone)]
struct SessionState {
    participant_id: String,
    opened_at: DateTime<Utc>,
    first_sample_at: Option<DateTime<Utc>>,
    last_sample_at: Option<DateTime<Utc>>,
    prev_sample_at: Option<DateTime<Utc>>,
    sample_count: u64,
    regions: HashMap<BodyRegion, RegionState>,
    focus: RollingWindow,
    aggregate_stress: RollingWindow,
}

impl SessionState {
    fn new(participant_id: String, opened_at: DateTime<Utc>, capacity: usize) -> Self {
        Self {
            participant_id,
            opened_at,
            first_sample_at: None,
            last_sample_at: None,
            prev_sample_at: None,
            sample_count: 0,
            regions: HashMap::new(),
            focus: RollingWindow::new(capacity),
            aggregate_stress: RollingWindow::new(capacity),
        }
    }

    fn snapshot(&self, trend_window: usize, forecast_points: usize) -> SessionSnapshot {
        let regions = self
            .regions
            .iter()
            .map(|(region, state)| {
                (
                    *region,
                    RegionSnapshot {
                        stress: state.stress.snapshot(trend_window),
                        tremor: state.tremor.snapshot(trend_window),
                        ema_stress: state.ema_stress,
                        ema_tremor: state.ema_tremor,
                        peak_stress: state.peak_stress,
                        peak_tremor: state.peak_tremor,
                    },
                )
            })
            .collect();

        let last_gap_s = match (self.prev_sample_at, self.last_sample_at) {
            (Some(prev), Some(last)) => {
                Some((last - prev).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        };

        SessionSnapshot {
            sample_count: self.sample_count,
            regions,
            focus: self.focus.snapshot(trend_window),
            aggregate_stress: self.aggregate_stress.snapshot(trend_window),
            stress_series: self.aggregate_stress.last_k(forecast_points),
            last_gap_s,
        }
    }
}

/// Metadata handed back when a session is closed or evicted.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub session_id: String,
    pub participant_id: String,
    pub opened_at: DateTime<Utc>,
    pub first_sample_at: Option<DateTime<Utc>>,
    pub last_sample_at: Option<DateTime<Utc>>,
    pub sample_count: u64,
}

/// Keyed store of per-session rolling state. Owns every buffer exclusively;
/// one instance per pipeline, injected rather than ambient, so separate
/// sessions and test instances never interfere.
#[derive(Debug)]
pub struct SessionStore {
    capacity: usize,
    trend_window: usize,
    forecast_points: usize,
    idle_timeout: Duration,
    sessions: HashMap<String, SessionState>,
}

impl SessionStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            capacity: config.window_capacity,
            trend_window: config.trend_window,
            // Keep enough series for the fit even when the trend window is
            // shorter than the forecaster's minimum
            forecast_points: config.trend_window.max(config.forecast_min_points),
            idle_timeout: Duration::seconds(config.idle_timeout_s as i64),
            sessions: HashMap::new(),
        }
    }

    /// Open a session. Idempotent: reopening an existing session is a no-op
    /// and keeps its accumulated state.
    pub fn open(&mut self, session_id: &str, participant_id: &str, now: DateTime<Utc>) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(participant_id.to_string(), now, self.capacity));
    }

    pub fn is_open(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Append a sample to its session, assigning the sequence number, and
    /// return the sample together with the post-append snapshot.
    ///
    /// Appending to a session that was never opened (or already closed) is
    /// rejected with `UnknownSession`; state is never auto-created.
    pub fn append(
        &mut self,
        mut sample: SessionSample,
    ) -> Result<(SessionSample, SessionSnapshot), EngineError> {
        let state = self
            .sessions
            .get_mut(&sample.session_id)
            .ok_or_else(|| EngineError::UnknownSession(sample.session_id.clone()))?;

        sample.sequence = state.sample_count;

        for (region, frame) in &sample.regions {
            state
                .regions
                .entry(*region)
                .or_insert_with(|| RegionState::new(self.capacity))
                .update(frame);
        }
        state.focus.push(sample.metrics.focus);
        if !sample.regions.is_empty() {
            let mean_stress = sample
                .regions
                .values()
                .map(|f| f.stress_trend)
                .sum::<f64>()
                / sample.regions.len() as f64;
            state.aggregate_stress.push(mean_stress);
        }

        state.prev_sample_at = state.last_sample_at;
        state.last_sample_at = Some(sample.taken_at);
        if state.first_sample_at.is_none() {
            state.first_sample_at = Some(sample.taken_at);
        }
        state.sample_count += 1;

        let snapshot = state.snapshot(self.trend_window, self.forecast_points);
        Ok((sample, snapshot))
    }

    /// Read-only view of a session's current state.
    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .get(session_id)
            .map(|s| s.snapshot(self.trend_window, self.forecast_points))
    }

    /// Close a session, releasing its buffers.
    pub fn close(&mut self, session_id: &str) -> Result<ClosedSession, EngineError> {
        let state = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;
        Ok(ClosedSession {
            session_id: session_id.to_string(),
            participant_id: state.participant_id,
            opened_at: state.opened_at,
            first_sample_at: state.first_sample_at,
            last_sample_at: state.last_sample_at,
            sample_count: state.sample_count,
        })
    }

    /// Release sessions with no samples since `now - idle_timeout`. Sessions
    /// that never received a sample are aged from their open time.
    pub fn evict_idle(&mut self, now: DateTime<Utc>) -> Vec<ClosedSession> {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| {
                let last_activity = s.last_sample_at.unwrap_or(s.opened_at);
                now - last_activity >= self.idle_timeout
            })
            .map(|(id, _)| id.clone())
            .collect();

        let mut closed = Vec::with_capacity(stale.len());
        for id in stale {
            if let Ok(meta) = self.close(&id) {
                closed.push(meta);
            }
        }
        closed
    }
}
