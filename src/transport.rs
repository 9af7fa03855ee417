use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;
use crate::types::ApiRequest;

/// Status and decoded body of an HTTP exchange, whatever the status.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the outbound HTTP call. Only the dispatcher thread calls this.
///
/// Non-2xx statuses are returned as responses, not errors; the dispatcher
/// decides what counts as a failure.
pub trait Transport: Send + Sync {
    fn perform(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// Blocking HTTP transport on `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&format!("steamgate/{}", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn perform(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let mut call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .timeout(timeout)
            .set("Accept", "application/json");
        for (key, value) in &request.query {
            call = call.query(key, value);
        }

        let response = match call.call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(e)) => {
                return Err(TransportError::Network(e.to_string()));
            }
        };

        let status = response.status();
        let text = response
            .into_string()
            .map_err(|e| TransportError::Network(format!("reading body: {e}")))?;

        // Error pages are often not JSON; only a 2xx body has to parse.
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(_) if !(200..300).contains(&status) => Value::Null,
            Err(e) => return Err(TransportError::MalformedBody(e.to_string())),
        };
        Ok(TransportResponse::new(status, body))
    }
}
