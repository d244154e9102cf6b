//! Scripted transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::PredictionTransport;
use crate::error::TransportError;
use crate::models::Channel;

/// Transport that answers each channel with a configured response and
/// counts the requests it receives. Channels without a response fail with
/// a network error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<Channel, Result<Value, TransportError>>>,
    health: Mutex<Option<Value>>,
    calls: Mutex<HashMap<Channel, u32>>,
    bodies: Mutex<Vec<(Channel, Value)>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `channel` with `body`.
    pub fn with_response(self, channel: Channel, body: Value) -> Self {
        self.set_response(channel, Ok(body));
        self
    }

    /// Fail `channel` with `error`.
    pub fn with_failure(self, channel: Channel, error: TransportError) -> Self {
        self.set_response(channel, Err(error));
        self
    }

    pub fn with_health(self, body: Value) -> Self {
        // ---
        *self.health.lock().unwrap_or_else(|p| p.into_inner()) = Some(body);
        self
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the scripted response for `channel`.
    pub fn set_response(&self, channel: Channel, response: Result<Value, TransportError>) {
        // ---
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(channel, response);
    }

    /// Number of requests received on `channel`.
    pub fn call_count(&self, channel: Channel) -> u32 {
        // ---
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&channel)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).values().sum()
    }

    /// Request bodies in arrival order.
    pub fn bodies(&self) -> Vec<(Channel, Value)> {
        self.bodies.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn reset_calls(&self) {
        // ---
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.bodies.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

#[async_trait]
impl PredictionTransport for MockTransport {
    async fn post(&self, channel: Channel, body: Value) -> Result<Value, TransportError> {
        // ---
        *self
            .calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(channel)
            .or_insert(0) += 1;
        self.bodies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((channel, body));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&channel)
            .cloned()
            .unwrap_or_else(|| {
                Err(TransportError::Network(format!(
                    "no response scripted for {}",
                    channel
                )))
            })
    }

    async fn health(&self) -> Result<Value, TransportError> {
        // ---
        self.health
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| TransportError::Network("backend unreachable".to_string()))
    }
}
