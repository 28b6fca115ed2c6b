//! Error types for the Kinesia analysis engine
//!
//! Per-sample validation failures are local: they are reported to the caller
//! and never crash the session or affect other sessions. Insufficient rolling
//! history is not an error at all; it is an explicit partial-result state on
//! the affected outputs (see [`crate::types::Forecast`]).

use thiserror::Error;

/// Errors that can occur while ingesting frames or configuring the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Frame is structurally unusable (missing session id, unparseable body).
    /// The frame is dropped and not analyzed.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A numeric field is non-finite or outside its physically plausible
    /// bounds. The frame is dropped and not analyzed.
    #[error("Out-of-range value in field {field}: {value}")]
    OutOfRangeValue { field: &'static str, value: f64 },

    /// The session was never opened (or was already closed). The caller must
    /// open a session first; state is never auto-created.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Invalid engine configuration. Fatal at startup, before any frame is
    /// processed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
