use std::time::Duration;

use intake_spec::{Transport, TransportError, TransportResponse};
use ureq::Agent;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP client for the submission endpoint. Non-2xx statuses are
/// returned as responses so the engine can judge them.
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, body: &str) -> Result<TransportResponse, TransportError> {
        tracing::debug!(url, bytes = body.len(), "posting submission");
        let mut response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::Body(err.to_string()))?;
        tracing::debug!(status, "endpoint answered");
        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}
