//! JSON-RPC 2.0 Request types
//!
//! A call is a single object with `jsonrpc`, `id`, `method` and `params`.
//! Capability servers are only ever sent `tools/call` and `tools/list`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{JSONRPC_VERSION, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

/// JSON-RPC 2.0 Request object
///
/// # Examples
///
/// ```
/// use mcp_sdk::protocol::JsonRpcRequest;
/// use serde_json::{json, Map};
///
/// let mut arguments = Map::new();
/// arguments.insert("query".to_string(), json!("up"));
///
/// let request = JsonRpcRequest::tools_call(1, "execute_range_query", arguments);
/// assert_eq!(request.jsonrpc, "2.0");
/// assert_eq!(request.method, "tools/call");
/// assert_eq!(request.params.unwrap()["name"], "execute_range_query");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// JSON-RPC protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: Value,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }

    /// Build a `tools/call` request for `name` with the given arguments.
    pub fn tools_call(id: u64, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let name: String = name.into();
        let params = json!({
            "name": name,
            "arguments": Value::Object(arguments),
        });
        Self::new(id, METHOD_TOOLS_CALL, Some(params))
    }

    /// Build a `tools/list` request.
    pub fn tools_list(id: u64) -> Self {
        Self::new(id, METHOD_TOOLS_LIST, Some(Value::Object(Map::new())))
    }

    /// Name of the tool this request calls, if it is a `tools/call`.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method != METHOD_TOOLS_CALL {
            return None;
        }
        self.params.as_ref()?.get("name")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_call_envelope_shape() {
        let mut arguments = Map::new();
        arguments.insert("namespace".to_string(), json!("default"));

        let request = JsonRpcRequest::tools_call(7, "pods_list_in_namespace", arguments);
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(
            wire,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {
                    "name": "pods_list_in_namespace",
                    "arguments": {"namespace": "default"}
                }
            })
        );
        assert_eq!(request.tool_name(), Some("pods_list_in_namespace"));
    }

    #[test]
    fn test_tools_list_has_no_tool_name() {
        let request = JsonRpcRequest::tools_list(1);
        assert_eq!(request.method, "tools/list");
        assert!(request.tool_name().is_none());
    }
}
