//! Error types for the MCP client.
//!
//! Only the transport layer produces Rust errors. Everything above it (the
//! tool invocation client) folds failures into
//! [`ToolResult`](crate::client::ToolResult) values instead of raising.

use std::time::Duration;
use thiserror::Error;

/// Transport-specific errors
///
/// Every variant maps to the `transport` failure class: the remote could not
/// be reached, did not answer in time, or did not speak HTTP/JSON-RPC.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS failure
    #[error("connection failed: {0}")]
    Connect(String),

    /// Request did not complete within the per-call timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Body was not a JSON-RPC envelope
    #[error("malformed response: {0}")]
    Decode(String),

    /// Body exceeded the configured size limit
    #[error("response exceeds size limit ({actual} > {limit})")]
    TooLarge {
        /// Bytes received when the limit was crossed
        actual: usize,
        /// Maximum size in bytes
        limit: usize,
    },

    /// Client construction or request building failed
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Map a `reqwest` failure that happened while sending a request.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connect(error_chain(&err))
        } else if err.is_decode() || err.is_body() {
            TransportError::Decode(error_chain(&err))
        } else {
            TransportError::Other(error_chain(&err))
        }
    }
}

/// `reqwest` hides the useful part ("Connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
