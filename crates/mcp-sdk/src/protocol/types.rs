//! MCP tool payloads
//!
//! - **Tools**: ToolDefinition, CallToolParams, CallToolResult, ToolContent,
//!   ListToolsResult

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ================================================================================================
// Tool Types
// ================================================================================================

/// Tool definition advertised by a server in `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input validation
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Definition with an empty object schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }
}

/// Parameters for calling a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolParams {
    /// Tool name to call
    pub name: String,

    /// Tool arguments (must match inputSchema)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of a tool call
///
/// `is_error` is the tool-level failure flag. It is distinct from the
/// JSON-RPC `error` member, which signals a protocol-level failure.
///
/// # Examples
///
/// ```
/// use mcp_sdk::protocol::{CallToolResult, ToolContent};
///
/// let result = CallToolResult {
///     content: vec![ToolContent::Text { text: "{\"resultType\":\"matrix\"}".to_string() }],
///     is_error: Some(false),
/// };
/// assert_eq!(result.first_text(), Some("{\"resultType\":\"matrix\"}"));
/// assert!(!result.failed());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    /// Result content blocks
    #[serde(default)]
    pub content: Vec<ToolContent>,

    /// Whether this result represents an error
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Whether the server flagged this result as a failure.
    pub fn failed(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// First content block whose declared kind is `text`.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ToolContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Explanation attached to a failed result.
    pub fn error_text(&self) -> String {
        match self.first_text() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => "Unknown error".to_string(),
        }
    }
}

/// Content block returned by a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        #[serde(default)]
        text: String,
    },

    /// Image content
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data
        data: String,

        /// Image MIME type (e.g., "image/png")
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Resource reference
    #[serde(rename = "resource")]
    Resource {
        /// Resource URI
        uri: String,
    },

    /// Any block kind this client does not interpret
    #[serde(other)]
    Other,
}

/// List tools result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListToolsResult {
    /// Available tools
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}
