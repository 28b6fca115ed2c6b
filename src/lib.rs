//! Kinesia Core - Real-time multi-sensor analysis engine for VR therapy sessions
//!
//! Kinesia turns raw per-frame body-sensor data into clinically meaningful,
//! deterministic analysis through a fixed pipeline: frame normalization →
//! rolling session state → stability / risk / forecast / anomaly / region /
//! confidence stages → intervention command, with an aggregate clinical
//! summary produced when the session closes.
//!
//! ## Modules
//!
//! - **Ingestion**: Validate raw frame records into immutable session samples
//! - **Session State**: Bounded rolling windows with streaming statistics
//! - **Analysis Stages**: Stability index, risk tiers, stress forecasting,
//!   anomaly detection, region ranking, confidence scoring
//! - **Orchestration**: Per-session pipeline driving all stages per sample

pub mod analyzer;
pub mod anomaly;
pub mod command;
pub mod confidence;
pub mod config;
pub mod error;
pub mod forecast;
pub mod normalizer;
pub mod regions;
pub mod risk;
pub mod stability;
pub mod stats;
pub mod types;
pub mod window;

pub use analyzer::SessionAnalyzer;
pub use config::EngineConfig;
pub use error::EngineError;

// Pipeline stage exports
pub use anomaly::AnomalyDetector;
pub use command::CommandPlanner;
pub use confidence::ConfidenceScorer;
pub use forecast::StressForecaster;
pub use normalizer::FrameNormalizer;
pub use regions::RegionRanker;
pub use risk::RiskClassifier;
pub use stability::StabilityCalculator;
pub use window::SessionStore;

// Data model exports
pub use types::{
    AnalysisResult, Anomaly, AnomalyKind, AnomalySeverity, BodyRegion, ClinicalSummary,
    CommandKind, CommandSeverity, Forecast, InterventionCommand, RawFrameRecord, RegionScore,
    RiskTier, SessionSample, StabilityIndex, TrendDirection,
};

/// Engine version embedded in reports and CLI output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports and diagnostics
pub const PRODUCER_NAME: &str = "kinesia-core";
