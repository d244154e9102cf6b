// src/transport/http.rs
//! reqwest-backed transport for the prediction backend.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde_json::Value;
use tracing::debug;

use super::PredictionTransport;
use crate::error::TransportError;
use crate::models::Channel;

/// JSON-over-HTTP transport rooted at a base URL.
///
/// No retries and no request timeout: a failed call is answered by the
/// channel fallback instead.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        // ---
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        // ---
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json(response: Response) -> Result<Value, TransportError> {
        // ---
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PredictionTransport for HttpTransport {
    async fn post(&self, channel: Channel, body: Value) -> Result<Value, TransportError> {
        // ---
        let url = self.url(channel.path());
        debug!("POST {} ({})", url, channel);

        let response = self.client.post(&url).json(&body).send().await?;
        Self::read_json(response).await
    }

    async fn health(&self) -> Result<Value, TransportError> {
        // ---
        let url = self.url("/api/health");
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        // ---
        let transport = HttpTransport::new("http://localhost:8000/").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8000");
        assert_eq!(
            transport.url(Channel::Pest.path()),
            "http://localhost:8000/api/predictions/pest"
        );
    }
}
