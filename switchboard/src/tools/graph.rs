//! Time-series graph proxy
//!
//! Runs a PromQL range query against the metrics capability server and
//! wraps the result in the envelope chart renderers consume:
//!
//! ```json
//! {"query": "...", "description": "...", "data": {"resultType": "matrix", "result": [...]}}
//! ```
//!
//! Failures never escape as errors; they come back as
//! `{"error": "...", "query": "...", "description": "..."}`.

use mcp_sdk::client::{Credential, ToolCall, ToolInvoker, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::capabilities::CapabilityDescriptor;

pub const RANGE_QUERY_OPERATION: &str = "execute_range_query";
pub const DEFAULT_START: &str = "NOW-1h";
pub const DEFAULT_END: &str = "NOW";
pub const DEFAULT_STEP: &str = "1m";

/// Range query request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub query: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl GraphRequest {
    pub fn new(query: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
            start: None,
            end: None,
            step: None,
        }
    }

    /// Tool arguments with every default filled.
    ///
    /// The metrics server rejects range queries without start, end or step,
    /// so blank values count as missing.
    pub fn arguments(&self) -> Map<String, Value> {
        fn or_default(value: &Option<String>, default: &str) -> Value {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Value::String(v.to_string()),
                _ => Value::String(default.to_string()),
            }
        }

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), Value::String(self.query.clone()));
        arguments.insert("start".to_string(), or_default(&self.start, DEFAULT_START));
        arguments.insert("end".to_string(), or_default(&self.end, DEFAULT_END));
        arguments.insert("step".to_string(), or_default(&self.step, DEFAULT_STEP));
        arguments
    }
}

/// Chart-ready result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphEnvelope {
    Data {
        query: String,
        description: String,
        data: Value,
    },
    Error {
        error: String,
        query: String,
        description: String,
    },
}

impl GraphEnvelope {
    pub fn from_result(request: &GraphRequest, result: ToolResult) -> Self {
        match result {
            ToolResult::Success(data) => GraphEnvelope::Data {
                query: request.query.clone(),
                description: request.description.clone(),
                data,
            },
            ToolResult::Failure(failure) => GraphEnvelope::Error {
                error: failure.to_string(),
                query: request.query.clone(),
                description: request.description.clone(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GraphEnvelope::Error { .. })
    }
}

/// Graph proxy bound to the metrics capability server
#[derive(Clone)]
pub struct GraphProxy {
    invoker: Arc<dyn ToolInvoker>,
    endpoint: String,
    auth_header: String,
    timeout: Duration,
}

impl GraphProxy {
    pub fn new(invoker: Arc<dyn ToolInvoker>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            invoker,
            endpoint: endpoint.into(),
            auth_header: "Authorization".to_string(),
            timeout,
        }
    }

    /// Proxy for the server described by `descriptor`
    pub fn for_capability(invoker: Arc<dyn ToolInvoker>, descriptor: &CapabilityDescriptor) -> Self {
        let mut proxy = Self::new(invoker, &descriptor.tool_endpoint, descriptor.call_timeout);
        proxy.auth_header = descriptor.auth_header.clone();
        proxy
    }

    /// The range query call for `request`, defaults filled
    pub fn range_call(&self, request: &GraphRequest, credential: Option<Credential>) -> ToolCall {
        ToolCall::new(&self.endpoint, RANGE_QUERY_OPERATION)
            .with_arguments(request.arguments())
            .with_credential(credential.map(|c| c.rehome(&self.auth_header)))
            .with_timeout(self.timeout)
    }

    /// Issue the range query
    pub async fn range_query(&self, request: &GraphRequest, credential: Option<Credential>) -> (ToolCall, ToolResult) {
        let call = self.range_call(request, credential);
        debug!(query = %request.query, "Graph range query");
        let result = self.invoker.invoke(&call).await;
        (call, result)
    }

    /// Issue the range query and wrap the result for charting
    pub async fn graph(&self, request: &GraphRequest, credential: Option<Credential>) -> GraphEnvelope {
        let (_, result) = self.range_query(request, credential).await;
        GraphEnvelope::from_result(request, result)
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn expected(value: &Option<String>, default: &str) -> String {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => default.to_string(),
        }
    }

    proptest! {
        #[test]
        fn test_window_always_complete(
            query in ".*",
            start in proptest::option::of(".*"),
            end in proptest::option::of(".*"),
            step in proptest::option::of("[ 0-9smhd]*"),
        ) {
            let request = GraphRequest {
                query: query.clone(),
                description: String::new(),
                start: start.clone(),
                end: end.clone(),
                step: step.clone(),
            };
            let arguments = request.arguments();

            prop_assert_eq!(arguments["query"].as_str(), Some(query.as_str()));
            for key in ["start", "end", "step"] {
                let value = arguments.get(key).and_then(Value::as_str);
                prop_assert!(value.is_some_and(|v| !v.trim().is_empty()), "{} missing", key);
            }
            let expected_start = expected(&start, DEFAULT_START);
            let expected_end = expected(&end, DEFAULT_END);
            let expected_step = expected(&step, DEFAULT_STEP);
            prop_assert_eq!(arguments["start"].as_str(), Some(expected_start.as_str()));
            prop_assert_eq!(arguments["end"].as_str(), Some(expected_end.as_str()));
            prop_assert_eq!(arguments["step"].as_str(), Some(expected_step.as_str()));
        }
    }
}
