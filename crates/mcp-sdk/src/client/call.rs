//! Tool calls and credentials

use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::transport::http::DEFAULT_TIMEOUT;

/// How the text content of a successful call is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Structured data is expected; the text block must parse as JSON
    #[default]
    Json,
    /// Text is returned as a JSON string as-is
    Text,
}

/// Bearer credential forwarded to a capability server
///
/// The token is sent verbatim as `<header>: Bearer <token>`. `Debug` output
/// never contains it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Header name (usually `Authorization`)
    pub header: String,
    /// Raw token, without the `Bearer ` prefix
    token: String,
}

impl Credential {
    /// Credential sent in the standard `Authorization` header
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::with_header("Authorization", token)
    }

    /// Credential sent in a custom header
    pub fn with_header(header: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            token: token.into(),
        }
    }

    /// Same token, different header
    pub fn rehome(&self, header: &str) -> Self {
        Self::with_header(header, self.token.clone())
    }

    /// Header name/value pair to put on the wire
    pub fn header_pair(&self) -> (String, String) {
        (self.header.clone(), format!("Bearer {}", self.token))
    }

    /// Raw token
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("header", &self.header)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// One remote call: which server, which operation, with what
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Capability server endpoint
    pub endpoint: String,

    /// Tool (operation) name
    pub operation: String,

    /// Tool arguments
    pub arguments: Map<String, Value>,

    /// Credential to forward
    pub credential: Option<Credential>,

    /// Expected payload format
    pub format: PayloadFormat,

    /// Per-call timeout
    pub timeout: Duration,
}

impl ToolCall {
    /// Create a call with no arguments, JSON payload and the default timeout
    pub fn new(endpoint: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            operation: operation.into(),
            arguments: Map::new(),
            credential: None,
            format: PayloadFormat::Json,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set one argument
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replace all arguments
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attach a credential
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Set the expected payload format
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// String argument, if present
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::bearer("sha256~abcdef");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("abcdef"));
        assert_eq!(
            credential.header_pair(),
            ("Authorization".to_string(), "Bearer sha256~abcdef".to_string())
        );
    }

    #[test]
    fn test_rehome_keeps_token() {
        let credential = Credential::bearer("tok").rehome("kubernetes-authorization");
        assert_eq!(credential.header, "kubernetes-authorization");
        assert_eq!(credential.token(), "tok");
    }

    #[test]
    fn test_builder() {
        let call = ToolCall::new("http://localhost:8002/mcp", "list_metrics")
            .arg("limit", 10)
            .with_format(PayloadFormat::Text);
        assert_eq!(call.arguments["limit"], 10);
        assert_eq!(call.format, PayloadFormat::Text);
        assert_eq!(call.timeout, DEFAULT_TIMEOUT);
    }
}
