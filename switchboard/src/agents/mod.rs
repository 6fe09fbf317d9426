//! Capability Handlers
//!
//! One handler per capability server. A handler receives the operation and
//! arguments the classifier extracted for its capability, enforces the
//! descriptor's scoping rules, invokes tools through the
//! [`lifecycle::HandlerRun`] state machine and reports a [`HandlerOutcome`].
//!
//! Handlers never fail: unreachable servers, protocol mismatches and remote
//! errors all become outcomes with a user-facing explanation.

use async_trait::async_trait;
use mcp_sdk::client::{Credential, FailureKind, ToolFailure, ToolInvoker, ToolResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::capabilities::{is_present, CapabilityDescriptor, Domain};
use crate::config::DocsConfig;

pub mod docs;
pub mod incidents;
pub mod kubernetes;
pub mod lifecycle;
pub mod metrics;

pub use docs::DocsHandler;
pub use incidents::IncidentsHandler;
pub use kubernetes::KubernetesHandler;
pub use lifecycle::{HandlerRun, Scoped};
pub use metrics::MetricsHandler;

/// What an earlier handler of the same turn did
#[derive(Debug, Clone, Serialize)]
pub struct PriorOutcome {
    /// Capability that ran
    pub capability: String,

    /// Its answer text, empty for a clarification
    pub answer: String,

    /// Arguments it ran with, after inheritance
    pub arguments: Map<String, Value>,
}

/// Input to one handler invocation
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// Original query text
    pub query: String,

    /// Operation the classifier chose; the descriptor default when absent
    pub operation: Option<String>,

    /// Arguments the classifier extracted for this capability
    pub arguments: Map<String, Value>,

    /// Caller's token, forwarded for this turn only
    pub credential: Option<Credential>,

    /// Earlier handlers of a sequential dispatch
    pub context: Vec<PriorOutcome>,
}

impl HandlerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation: None,
            arguments: Map::new(),
            credential: None,
            context: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_context(mut self, context: Vec<PriorOutcome>) -> Self {
        self.context = context;
        self
    }

    /// Requested operation, falling back to the descriptor default
    pub fn operation_or_default(&self, descriptor: &CapabilityDescriptor) -> String {
        self.operation
            .clone()
            .filter(|op| !op.trim().is_empty())
            .unwrap_or_else(|| descriptor.default_operation.clone())
    }

    /// Arguments with missing narrowing keys inherited from earlier handlers.
    ///
    /// Only keys that some scoping rule of `descriptor` accepts are inherited;
    /// the most recent earlier handler wins.
    pub fn scoped_arguments(&self, descriptor: &CapabilityDescriptor) -> Map<String, Value> {
        let mut arguments = self.arguments.clone();

        for key in descriptor.narrowing_keys() {
            if is_present(arguments.get(key)) {
                continue;
            }
            let inherited = self
                .context
                .iter()
                .rev()
                .filter_map(|prior| prior.arguments.get(key))
                .find(|value| is_present(Some(*value)));
            if let Some(value) = inherited {
                arguments.insert(key.to_string(), value.clone());
            }
        }

        arguments
    }
}

/// Result of one handler invocation
#[derive(Debug, Clone, Serialize)]
pub struct HandlerOutcome {
    /// Capability that produced the outcome
    pub capability_name: String,

    /// Answer text; empty when a clarification is needed
    pub answer: String,

    /// Every tool result of the invocation, in call order
    pub evidence: Vec<ToolResult>,

    /// The request was too broad to execute
    pub needs_clarification: bool,

    /// Question to put to the user, set with `needs_clarification`
    pub clarification_prompt: Option<String>,
}

impl HandlerOutcome {
    pub fn answered(capability: impl Into<String>, answer: impl Into<String>, evidence: Vec<ToolResult>) -> Self {
        Self {
            capability_name: capability.into(),
            answer: answer.into(),
            evidence,
            needs_clarification: false,
            clarification_prompt: None,
        }
    }

    pub fn clarify(capability: impl Into<String>, prompt: impl Into<String>, evidence: Vec<ToolResult>) -> Self {
        let prompt = prompt.into();
        Self {
            capability_name: capability.into(),
            answer: String::new(),
            evidence,
            needs_clarification: true,
            clarification_prompt: Some(prompt),
        }
    }

    /// Number of tool results recorded
    pub fn tool_calls(&self) -> usize {
        self.evidence.len()
    }
}

/// A handler for one capability
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Descriptor this handler enforces
    fn descriptor(&self) -> &Arc<CapabilityDescriptor>;

    /// Capability name
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Handle one request. Never fails.
    async fn handle(&self, request: HandlerRequest) -> HandlerOutcome;
}

/// The built-in handler for a descriptor's domain
pub fn builtin_handler(
    descriptor: Arc<CapabilityDescriptor>,
    invoker: Arc<dyn ToolInvoker>,
    docs: &DocsConfig,
) -> Arc<dyn CapabilityHandler> {
    match descriptor.domain {
        Domain::Kubernetes => Arc::new(KubernetesHandler::new(descriptor, invoker)),
        Domain::Metrics => Arc::new(MetricsHandler::new(descriptor, invoker)),
        Domain::Incidents => Arc::new(IncidentsHandler::new(descriptor, invoker)),
        Domain::Documentation => Arc::new(DocsHandler::new(descriptor, invoker, docs.site_filter.clone())),
    }
}

/// User-facing explanation of a failed tool call
pub fn describe_failure(descriptor: &CapabilityDescriptor, failure: &ToolFailure) -> String {
    let title = descriptor.domain.title();
    match failure.kind {
        FailureKind::Transport => format!("Couldn't reach the {} service, try again.", title),
        FailureKind::Protocol => {
            warn!(
                capability = %descriptor.name,
                detail = %failure.detail,
                "Protocol error from capability server"
            );
            format!(
                "The {} service sent a response I couldn't interpret ({}). \
                 Switchboard and the server are probably running incompatible versions.",
                title, failure.detail
            )
        }
        FailureKind::Remote => format!("The {} service reported an error: {}", title, failure.detail),
        FailureKind::NoData => format!("The {} service returned no data.", title),
        FailureKind::ParseFailure => format!(
            "The {} service returned data I couldn't parse: {}",
            title, failure.detail
        ),
        FailureKind::Rejected => format!("I can't do that: {}", failure.detail),
    }
}

/// Render arguments as `key=value` pairs for answers
pub(crate) fn render_arguments(arguments: &Map<String, Value>) -> String {
    arguments
        .iter()
        .filter(|(_, value)| is_present(Some(*value)))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cut text to at most `limit` characters, noting the cut
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{}\n… (truncated)", kept.trim_end())
}
