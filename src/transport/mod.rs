//! Backend transport gateway.
//!
//! [`PredictionTransport`] is the seam between the aggregator and the
//! network. [`HttpTransport`] talks to the real backend; [`MockTransport`]
//! serves scripted responses for tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::models::Channel;

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

// ---

/// One JSON POST per channel, plus a health probe.
#[async_trait]
pub trait PredictionTransport: Send + Sync {
    /// POST `body` to the channel's path and return the parsed JSON body.
    ///
    /// Non-2xx status, network failure and unparseable bodies are errors.
    async fn post(&self, channel: Channel, body: Value) -> Result<Value, TransportError>;

    /// `GET /api/health`.
    async fn health(&self) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::normalize::{DEFAULT_SOIL, DEFAULT_WEATHER};
    use serde_json::json;

    #[test]
    fn test_post_reaches_scripted_channel() {
        // ---
        let transport = MockTransport::new()
            .with_response(Channel::Soil, json!({"soilHealthScore": 70}))
            .with_failure(Channel::Rainfall, TransportError::Network("down".into()));

        let body = serde_json::to_value(DEFAULT_SOIL).unwrap();
        let soil = tokio_test::block_on(transport.post(Channel::Soil, body)).unwrap();
        assert_eq!(soil["soilHealthScore"], 70);

        let body = serde_json::to_value(DEFAULT_WEATHER).unwrap();
        let rain = tokio_test::block_on(transport.post(Channel::Rainfall, body));
        assert_eq!(rain, Err(TransportError::Network("down".into())));

        assert_eq!(transport.call_count(Channel::Soil), 1);
        assert_eq!(transport.call_count(Channel::Rainfall), 1);
        assert_eq!(transport.bodies()[0].1["organic_matter"], 3.5);
    }

    #[test]
    fn test_channel_paths() {
        // ---
        assert_eq!(Channel::Soil.path(), "/api/soil-health/analyze");
        assert_eq!(Channel::Yield.path(), "/api/crop-prediction/recommend");
        assert_eq!(Channel::Pest.path(), "/api/predictions/pest");
        assert_eq!(Channel::Rainfall.path(), "/api/predictions/rainfall");
    }
}
