// TASALIGN ERROR KINDS
// PER-CANDIDATE FAILURES ARE ABSORBED BY THE SEARCH, WHOLE-RUN FAILURES
// PROPAGATE THROUGH THE SAFETY SUPERVISOR.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TasError {
    #[error("switch clock unavailable: {0}")]
    ClockUnavailable(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("apply failed after {attempts} attempts: {last_error}")]
    ApplyFailed { attempts: u32, last_error: String },
    #[error("telemetry poll skipped: {0}")]
    MeasurementGap(String),
    #[error("no telemetry samples in window")]
    NoSamples,
    #[error("sensor command failed: {0}")]
    Sensor(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TasError {
    // CANDIDATE-LOCAL FAILURES DEGRADE ONE PROBE POINT. EVERYTHING ELSE ENDS THE RUN.
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, Self::ApplyFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, TasError>;
