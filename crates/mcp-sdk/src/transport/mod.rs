//! Client transport layer
//!
//! A transport delivers one JSON-RPC request to a capability server and hands
//! back the matching response envelope. It knows nothing about tools; the
//! [`client`](crate::client) module interprets the envelope.
//!
//! # Available Transports
//!
//! - [`HttpTransport`]: MCP streamable HTTP (plain JSON or `text/event-stream`
//!   replies) over `reqwest`
//!
//! Tests substitute their own implementation of [`ClientTransport`].

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

pub mod http;

pub use http::{HttpTransport, HttpTransportConfig};

/// Per-request options
#[derive(Clone)]
pub struct RequestOptions {
    /// Extra HTTP headers (credentials included)
    pub headers: Vec<(String, String)>,

    /// Upper bound for the whole exchange
    pub timeout: Duration,
}

impl RequestOptions {
    /// Options with the given timeout and no extra headers.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            headers: Vec::new(),
            timeout,
        }
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("RequestOptions")
            .field("headers", &header_names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Transport abstraction for the client side of MCP
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Send a request to `endpoint` and wait for its response.
    ///
    /// Exactly one request is issued; implementations must not retry.
    async fn post(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        options: &RequestOptions,
    ) -> Result<JsonRpcResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_header_values() {
        let options = RequestOptions {
            headers: vec![("Authorization".to_string(), "Bearer s3cret".to_string())],
            timeout: Duration::from_secs(5),
        };
        let rendered = format!("{:?}", options);
        assert!(rendered.contains("Authorization"));
        assert!(!rendered.contains("s3cret"));
    }
}
