//! Tool invocation outcomes
//!
//! A [`ToolResult`] is either a parsed payload or a classified failure. The
//! enum makes "failed with a payload" and "succeeded with an error"
//! unrepresentable; the wire form is still the flat `{ok, payload, error}`
//! object consumers expect.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::fmt;

/// Failure classes of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Server unreachable, timed out, or did not speak HTTP/JSON-RPC
    Transport,
    /// JSON-RPC `error` member present, or envelope unusable
    Protocol,
    /// Server answered but flagged the tool result as an error
    Remote,
    /// Successful envelope without a text content block
    NoData,
    /// Text content was not the structured data that was expected
    ParseFailure,
    /// Call refused locally before reaching the network
    Rejected,
}

/// A classified invocation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable detail (untrusted server text for `Remote`)
    pub detail: String,
}

impl ToolFailure {
    /// Create a new failure
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Transport-class failure
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, detail)
    }

    /// Protocol-class failure
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Protocol, detail)
    }

    /// Remote-content failure
    pub fn remote(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Remote, detail)
    }

    /// Local rejection
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, detail)
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Transport => write!(f, "transport: {}", self.detail),
            FailureKind::Protocol => write!(f, "protocol: {}", self.detail),
            FailureKind::Remote => write!(f, "remote: {}", self.detail),
            FailureKind::NoData => write!(f, "no data returned"),
            FailureKind::ParseFailure => write!(f, "parse failure: {}", self.detail),
            FailureKind::Rejected => write!(f, "rejected: {}", self.detail),
        }
    }
}

impl std::error::Error for ToolFailure {}

/// Outcome of one remote tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// Parsed payload
    Success(Value),
    /// Classified failure
    Failure(ToolFailure),
}

impl ToolResult {
    /// Successful result
    pub fn success(payload: Value) -> Self {
        ToolResult::Success(payload)
    }

    /// Failed result
    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        ToolResult::Failure(ToolFailure::new(kind, detail))
    }

    /// `ok` flag of the wire form
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }

    /// Payload, present only on success
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResult::Success(payload) => Some(payload),
            ToolResult::Failure(_) => None,
        }
    }

    /// Rendered error, present only on failure
    pub fn error(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }

    /// Structured failure, present only on failure
    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            ToolResult::Success(_) => None,
            ToolResult::Failure(failure) => Some(failure),
        }
    }

    /// Consume into a standard `Result`
    pub fn into_result(self) -> Result<Value, ToolFailure> {
        match self {
            ToolResult::Success(payload) => Ok(payload),
            ToolResult::Failure(failure) => Err(failure),
        }
    }
}

impl From<ToolFailure> for ToolResult {
    fn from(failure: ToolFailure) -> Self {
        ToolResult::Failure(failure)
    }
}

impl Serialize for ToolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ToolResult", 2)?;
        match self {
            ToolResult::Success(payload) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("payload", payload)?;
            }
            ToolResult::Failure(failure) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", &failure.to_string())?;
            }
        }
        state.end()
    }
}
