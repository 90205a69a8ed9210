//! Domain error types for `leakguard`.
//!
//! Startup and configuration paths use `anyhow`; everything that crosses a
//! request boundary uses one of these typed errors so handlers can map them
//! to the right status code or structured agent payload.

use thiserror::Error;

// ---

/// Failures raised by the classifier adapter while scoring a reading.
#[derive(Debug, Error, PartialEq)]
pub enum ClassifierError {
    /// Categorical value outside the model's trained vocabulary.
    #[error("unseen category '{value}' for feature {feature}")]
    UnseenCategory { feature: &'static str, value: String },

    /// The model produced something that is not a probability.
    #[error("classifier produced invalid probability {0}")]
    InvalidProbability(f64),
}

/// Failures of a single prediction request.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Reading rejected before it reached the classifier.
    #[error("invalid reading: {0}")]
    Validation(String),

    /// Classifier could not score the reading.
    #[error("model scoring failed: {0}")]
    Scoring(#[from] ClassifierError),

    /// Remote prediction endpoint failed or was unreachable.
    #[error("prediction service error: {0}")]
    Remote(String),
}

impl PredictError {
    /// Create a new validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failures of the telemetry log store.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("telemetry log unavailable: {0}")]
    Unavailable(String),

    #[error("telemetry log did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures talking to the language model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model request timed out")]
    Timeout,

    #[error("language model transport error: {0}")]
    Transport(String),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode language model response: {0}")]
    Decode(String),

    #[error("language model returned no candidates")]
    Empty,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}
