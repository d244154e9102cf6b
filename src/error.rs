//! Error kinds used inside the prediction client.
//!
//! None of these escape [`crate::PredictionService::generate_predictions`]:
//! channel failures are absorbed by fallbacks and anything else is turned
//! into a comprehensive fallback result at the aggregator boundary.

use thiserror::Error;

/// Failure talking to the prediction backend.
///
/// `Clone` because one request result is shared between every caller
/// awaiting the same in-flight key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Backend answered with a status outside `200..=299`.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection refused, DNS failure, reset, ...
    #[error("network error: {0}")]
    Network(String),

    /// Body was not JSON, or not the JSON shape the channel expects.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The task driving the request died before producing a result.
    #[error("request task aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        // ---
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}

/// Failure resolving a channel that no fallback should mask.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Unexpected failure inside the client itself.
    #[error("internal error: {0}")]
    Internal(String),
}
