//! Classification contract
//!
//! The orchestrator never decides on its own which capability answers a
//! query. It asks a [`Classifier`] for a [`DispatchDecision`] and executes
//! that decision deterministically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::capabilities::{CapabilityDescriptor, CapabilityRegistry, Domain};

pub mod llm;

pub use llm::LlmClassifier;

/// How selected handlers are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DispatchMode {
    /// Listed order, each handler sees the earlier outcomes
    #[serde(alias = "sequential")]
    Sequential,
    /// Concurrently, no ordering dependency
    #[default]
    #[serde(alias = "parallel")]
    Parallel,
}

/// One selected capability and what the classifier extracted for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl Selection {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            operation: None,
            arguments: Map::new(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Which handlers answer a turn, and how
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DispatchDecision {
    #[serde(default)]
    pub selected: Vec<Selection>,
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_answer: Option<String>,
}

impl DispatchDecision {
    /// Answer without invoking any handler
    pub fn direct(answer: impl Into<String>) -> Self {
        Self {
            direct_answer: Some(answer.into()),
            ..Default::default()
        }
    }

    pub fn parallel(selected: Vec<Selection>) -> Self {
        Self {
            selected,
            mode: DispatchMode::Parallel,
            direct_answer: None,
        }
    }

    pub fn sequential(selected: Vec<Selection>) -> Self {
        Self {
            selected,
            mode: DispatchMode::Sequential,
            direct_answer: None,
        }
    }

    /// Make the decision executable against `registry`.
    ///
    /// Unknown and repeated capability names are dropped. Selections take
    /// precedence over a direct answer, and a blank direct answer is no answer.
    pub fn normalize(mut self, registry: &CapabilityRegistry) -> Self {
        let mut seen = HashSet::new();
        self.selected.retain(|selection| {
            if !registry.contains(&selection.capability) {
                warn!(capability = %selection.capability, "Dropping selection of unknown capability");
                return false;
            }
            if !seen.insert(selection.capability.clone()) {
                warn!(capability = %selection.capability, "Dropping duplicate selection");
                return false;
            }
            true
        });

        if self.direct_answer.as_deref().is_some_and(|a| a.trim().is_empty()) {
            self.direct_answer = None;
        }
        if !self.selected.is_empty() && self.direct_answer.is_some() {
            debug!("Decision has both selections and a direct answer, keeping the selections");
            self.direct_answer = None;
        }
        self
    }

    /// Selected capability names in dispatch order
    pub fn names(&self) -> Vec<&str> {
        self.selected.iter().map(|s| s.capability.as_str()).collect()
    }
}

/// What the classifier is told about one capability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub domain: Domain,
    pub description: String,
    pub operations: Vec<String>,
}

impl From<&CapabilityDescriptor> for CapabilitySummary {
    fn from(descriptor: &CapabilityDescriptor) -> Self {
        let operations = match &descriptor.tool_set {
            Some(tool_set) => tool_set.operations.iter().cloned().collect(),
            None => descriptor.operations.iter().cloned().collect(),
        };
        Self {
            name: descriptor.name.clone(),
            domain: descriptor.domain,
            description: descriptor.description.clone(),
            operations,
        }
    }
}

/// A completed earlier turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub response: String,
}

/// Input to one classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub query: String,
    pub history: Vec<HistoryEntry>,
    /// Clarification the previous turn asked for, if any
    pub pending_clarification: Option<String>,
    pub capabilities: Vec<CapabilitySummary>,
}

impl ClassificationRequest {
    pub fn new(query: impl Into<String>, registry: &CapabilityRegistry) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
            pending_clarification: None,
            capabilities: registry
                .descriptors()
                .map(|d| CapabilitySummary::from(d.as_ref()))
                .collect(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>, pending_clarification: Option<String>) -> Self {
        self.history = history;
        self.pending_clarification = pending_clarification;
        self
    }
}

/// Classification errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// No API key configured
    #[error("classifier not configured: {0}")]
    NotConfigured(String),

    #[error("classifier unreachable: {0}")]
    Network(String),

    #[error("classifier timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status
    #[error("classifier returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Reply was not a usable decision
    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClassifierError::Timeout(err.to_string())
        } else if err.is_decode() {
            ClassifierError::InvalidResponse(err.to_string())
        } else {
            ClassifierError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::InvalidResponse(err.to_string())
    }
}

/// External classification capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: ClassificationRequest) -> Result<DispatchDecision, ClassifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwitchboardConfig;
    use serde_json::json;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::from_config(&SwitchboardConfig::default())
    }

    #[test]
    fn test_wire_shape() {
        let decision: DispatchDecision = serde_json::from_value(json!({
            "selected": [{"capability": "metrics", "arguments": {"metric": "up"}}, {"capability": "incidents"}],
            "mode": "PARALLEL"
        }))
        .unwrap();

        assert_eq!(decision.mode, DispatchMode::Parallel);
        assert_eq!(decision.names(), vec!["metrics", "incidents"]);
        assert_eq!(decision.selected[0].arguments["metric"], "up");
        assert_eq!(
            serde_json::to_value(DispatchMode::Sequential).unwrap(),
            json!("SEQUENTIAL")
        );
    }

    #[test]
    fn test_normalize_drops_unknown_and_duplicates() {
        let decision = DispatchDecision::parallel(vec![
            Selection::new("metrics"),
            Selection::new("logging"),
            Selection::new("metrics").with_operation("list_metrics"),
            Selection::new("incidents"),
        ])
        .normalize(&registry());

        assert_eq!(decision.names(), vec!["metrics", "incidents"]);
        assert!(decision.selected[0].operation.is_none());
    }

    #[test]
    fn test_normalize_selections_win_over_direct_answer() {
        let mut decision = DispatchDecision::parallel(vec![Selection::new("docs")]);
        decision.direct_answer = Some("Operators are controllers.".to_string());
        let decision = decision.normalize(&registry());
        assert!(decision.direct_answer.is_none());
        assert_eq!(decision.names(), vec!["docs"]);

        let blank = DispatchDecision::direct("  ").normalize(&registry());
        assert!(blank.direct_answer.is_none());
        assert!(blank.selected.is_empty());
    }

    #[test]
    fn test_request_lists_registered_capabilities() {
        let request = ClassificationRequest::new("hello", &registry());
        let names: Vec<&str> = request.capabilities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["kubernetes", "metrics", "incidents", "docs"]);
        assert!(request.capabilities[1].operations.contains(&"list_metrics".to_string()));
    }
}
