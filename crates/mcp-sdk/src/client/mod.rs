//! Tool invocation client
//!
//! [`McpToolClient`] turns a [`ToolCall`] into one `tools/call` request and
//! folds whatever comes back into a [`ToolResult`]. It never returns an error
//! and never retries: remote operations are not guaranteed idempotent.
//!
//! # Failure classes
//!
//! 1. The transport failed (connection refused, timeout, malformed HTTP)
//!    → [`FailureKind::Transport`]
//! 2. The envelope carries a JSON-RPC `error` → [`FailureKind::Protocol`]
//! 3. The tool result sets `isError` → [`FailureKind::Remote`]
//! 4. No text block → [`FailureKind::NoData`]; text that should be JSON but
//!    is not → [`FailureKind::ParseFailure`]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::protocol::{CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolDefinition};
use crate::transport::{ClientTransport, HttpTransport, RequestOptions};

pub mod call;
pub mod result;

pub use call::{Credential, PayloadFormat, ToolCall};
pub use result::{FailureKind, ToolFailure, ToolResult};

/// Anything that can execute tool calls against capability servers
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute one call. Never fails; failures are values.
    async fn invoke(&self, call: &ToolCall) -> ToolResult;

    /// Enumerate the tools a server advertises.
    async fn list_tools(
        &self,
        endpoint: &str,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Result<Vec<ToolDefinition>, ToolFailure>;
}

/// JSON-RPC tool client over a [`ClientTransport`]
pub struct McpToolClient<T = HttpTransport> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: ClientTransport> McpToolClient<T> {
    /// Create a client on top of a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn exchange(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Result<Value, ToolFailure> {
        let mut options = RequestOptions::with_timeout(timeout);
        if let Some(credential) = credential {
            options.headers.push(credential.header_pair());
        }

        let response: JsonRpcResponse = self
            .transport
            .post(endpoint, request, &options)
            .await
            .map_err(|e| ToolFailure::transport(e.to_string()))?;

        if let Some(error) = response.error {
            warn!(endpoint, method = %request.method, %error, "Capability server returned a protocol error");
            return Err(ToolFailure::protocol(error.to_string()));
        }

        response
            .result
            .ok_or_else(|| ToolFailure::protocol("response carried neither result nor error"))
    }
}

#[async_trait]
impl<T: ClientTransport> ToolInvoker for McpToolClient<T> {
    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let request = JsonRpcRequest::tools_call(self.next_id(), &call.operation, call.arguments.clone());

        let credential = if call.credential.is_some() { "present" } else { "absent" };
        debug!(
            endpoint = %call.endpoint,
            operation = %call.operation,
            credential,
            "Invoking tool"
        );

        let result = match self
            .exchange(&call.endpoint, &request, call.credential.as_ref(), call.timeout)
            .await
        {
            Ok(result) => interpret_call_result(result, call.format),
            Err(failure) => ToolResult::Failure(failure),
        };

        debug!(
            operation = %call.operation,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool invocation finished"
        );

        result
    }

    async fn list_tools(
        &self,
        endpoint: &str,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Result<Vec<ToolDefinition>, ToolFailure> {
        let request = JsonRpcRequest::tools_list(self.next_id());
        let result = self.exchange(endpoint, &request, credential, timeout).await?;

        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ToolFailure::protocol(format!("invalid tools/list result: {}", e)))?;

        Ok(listed.tools)
    }
}

/// Interpret the `result` member of a `tools/call` response.
pub fn interpret_call_result(result: Value, format: PayloadFormat) -> ToolResult {
    let call_result: CallToolResult = match serde_json::from_value(result) {
        Ok(call_result) => call_result,
        Err(e) => {
            return ToolResult::failed(FailureKind::Protocol, format!("invalid tools/call result: {}", e));
        }
    };

    if call_result.failed() {
        return ToolResult::failed(FailureKind::Remote, call_result.error_text());
    }

    let text = match call_result.first_text() {
        Some(text) if !text.trim().is_empty() => text,
        _ => return ToolResult::failed(FailureKind::NoData, ""),
    };

    match format {
        PayloadFormat::Text => ToolResult::success(Value::String(text.to_string())),
        PayloadFormat::Json => match serde_json::from_str::<Value>(text) {
            Ok(payload) => ToolResult::success(payload),
            Err(e) => ToolResult::failed(FailureKind::ParseFailure, e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpret_matrix_payload() {
        let result = interpret_call_result(
            json!({
                "content": [{"type": "text", "text": "{\"resultType\":\"matrix\",\"result\":[]}"}],
                "isError": false
            }),
            PayloadFormat::Json,
        );
        assert_eq!(result.payload(), Some(&json!({"resultType": "matrix", "result": []})));
    }

    #[test]
    fn test_interpret_remote_error() {
        let result = interpret_call_result(
            json!({
                "content": [{"type": "text", "text": "query must contain a label matcher"}],
                "isError": true
            }),
            PayloadFormat::Json,
        );
        assert_eq!(
            result.error().as_deref(),
            Some("remote: query must contain a label matcher")
        );
    }

    #[test]
    fn test_interpret_skips_non_text_blocks() {
        let result = interpret_call_result(
            json!({
                "content": [
                    {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                    {"type": "text", "text": "NAME  READY\nweb-1 1/1"}
                ]
            }),
            PayloadFormat::Text,
        );
        assert_eq!(result.payload(), Some(&json!("NAME  READY\nweb-1 1/1")));
    }

    #[test]
    fn test_interpret_no_text_block() {
        let result = interpret_call_result(
            json!({"content": [{"type": "resource", "uri": "file:///x"}]}),
            PayloadFormat::Json,
        );
        assert_eq!(result.error().as_deref(), Some("no data returned"));
    }

    #[test]
    fn test_interpret_parse_failure() {
        let result = interpret_call_result(
            json!({"content": [{"type": "text", "text": "not json"}]}),
            PayloadFormat::Json,
        );
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ParseFailure);
        assert!(result.error().unwrap().starts_with("parse failure: "));
    }

    #[test]
    fn test_interpret_malformed_result() {
        let result = interpret_call_result(json!({"content": "oops"}), PayloadFormat::Json);
        assert_eq!(result.failure().unwrap().kind, FailureKind::Protocol);
    }
}
