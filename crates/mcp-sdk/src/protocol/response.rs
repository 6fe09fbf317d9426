//! JSON-RPC 2.0 Response types
//!
//! A response carries exactly one of `result` or `error`. Servers in the wild
//! are not always strict about it, so both are optional on decode and the
//! client decides what a missing member means.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::JSONRPC_VERSION;

/// JSON-RPC 2.0 Response object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// JSON-RPC protocol version (must be "2.0")
    #[serde(default)]
    pub jsonrpc: String,

    /// Response identifier (matches request id)
    #[serde(default)]
    pub id: Option<Value>,

    /// Result value (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error object (present on error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a new success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create a new error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// Whether the envelope answers a request (as opposed to being a
    /// notification relayed on an event stream).
    pub fn is_reply(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,

    /// Short description
    pub message: String,

    /// Additional server-defined data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Standard "method not found" error (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Standard "invalid params" error (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
