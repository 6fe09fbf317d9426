//! Capability descriptors
//!
//! A [`CapabilityDescriptor`] describes one capability server: what it is
//! for, which read-only operations may be forwarded to it, and the scoping
//! rules a request must pass before any of those operations run.

use mcp_sdk::client::PayloadFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::tools::promql;

mod builtin;
pub mod registry;

pub use registry::{CapabilityRegistry, DiscoveryReport, ToolSet};

/// Capability domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Kubernetes,
    Metrics,
    Incidents,
    Documentation,
}

impl Domain {
    /// Title used when attributing answers
    pub fn title(&self) -> &'static str {
        match self {
            Domain::Kubernetes => "Cluster resources",
            Domain::Metrics => "Metrics",
            Domain::Incidents => "Incidents",
            Domain::Documentation => "Documentation",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Condition under which a request is too broad to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// None of `any_of` is present and non-empty
    MissingNarrowing {
        operations: Vec<String>,
        any_of: Vec<String>,
    },
    /// `key` is absent or blank
    EmptyArgument { operations: Vec<String>, key: String },
    /// No label matcher, neither in `labels_key` nor inside the PromQL in `query_key`
    MissingLabelSelector {
        operations: Vec<String>,
        labels_key: String,
        query_key: String,
    },
}

impl Predicate {
    /// Whether the predicate fires for this operation and these arguments.
    ///
    /// An empty operation list applies the predicate to every operation.
    pub fn matches(&self, operation: &str, arguments: &Map<String, Value>) -> bool {
        if !applies_to(self.operations(), operation) {
            return false;
        }

        match self {
            Predicate::MissingNarrowing { any_of, .. } => {
                !any_of.iter().any(|key| is_present(arguments.get(key)))
            }
            Predicate::EmptyArgument { key, .. } => !is_present(arguments.get(key)),
            Predicate::MissingLabelSelector {
                labels_key,
                query_key,
                ..
            } => {
                let labelled = is_present(arguments.get(labels_key));
                let matched_in_query = arguments
                    .get(query_key)
                    .and_then(Value::as_str)
                    .is_some_and(promql::has_label_matcher);
                !labelled && !matched_in_query
            }
        }
    }

    /// Operations the predicate applies to (empty = all)
    pub fn operations(&self) -> &[String] {
        match self {
            Predicate::MissingNarrowing { operations, .. }
            | Predicate::EmptyArgument { operations, .. }
            | Predicate::MissingLabelSelector { operations, .. } => operations,
        }
    }

    /// Argument keys that satisfy the predicate
    pub fn narrowing_keys(&self) -> Vec<&str> {
        match self {
            Predicate::MissingNarrowing { any_of, .. } => any_of.iter().map(String::as_str).collect(),
            Predicate::EmptyArgument { key, .. } => vec![key.as_str()],
            Predicate::MissingLabelSelector { labels_key, .. } => vec![labels_key.as_str()],
        }
    }
}

fn applies_to(operations: &[String], operation: &str) -> bool {
    operations.is_empty() || operations.iter().any(|op| op == operation)
}

/// Present means non-null and, for strings and collections, non-empty
pub(crate) fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// A predicate and the question asked when it fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingRule {
    pub predicate: Predicate,
    pub prompt: String,
}

impl ScopingRule {
    pub fn missing_narrowing(operations: &[&str], any_of: &[&str], prompt: &str) -> Self {
        Self {
            predicate: Predicate::MissingNarrowing {
                operations: to_strings(operations),
                any_of: to_strings(any_of),
            },
            prompt: prompt.to_string(),
        }
    }

    pub fn empty_argument(operations: &[&str], key: &str, prompt: &str) -> Self {
        Self {
            predicate: Predicate::EmptyArgument {
                operations: to_strings(operations),
                key: key.to_string(),
            },
            prompt: prompt.to_string(),
        }
    }

    pub fn missing_label_selector(operations: &[&str], labels_key: &str, query_key: &str, prompt: &str) -> Self {
        Self {
            predicate: Predicate::MissingLabelSelector {
                operations: to_strings(operations),
                labels_key: labels_key.to_string(),
                query_key: query_key.to_string(),
            },
            prompt: prompt.to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Everything Switchboard knows about one capability server
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    /// Registry key, also the name the classifier selects
    pub name: String,

    pub domain: Domain,

    /// Domain description shown to the classifier
    pub description: String,

    /// Always true; mutating operations are never enumerated
    pub read_only: bool,

    /// Operations that may be forwarded
    pub operations: BTreeSet<String>,

    /// Operation used when the classifier does not name one
    pub default_operation: String,

    /// Evaluated in declared order, first match wins
    pub scoping_rules: Vec<ScopingRule>,

    pub tool_endpoint: String,

    /// Header carrying the forwarded bearer token
    pub auth_header: String,

    pub payload_format: PayloadFormat,

    pub call_timeout: Duration,

    /// Upper bound on tool calls per turn
    pub max_calls: u32,

    /// What the server advertised at startup, if discovery reached it
    pub tool_set: Option<ToolSet>,
}

impl CapabilityDescriptor {
    /// Time a handler may spend on one turn
    pub fn turn_budget(&self) -> Duration {
        self.call_timeout * self.max_calls
    }

    /// First scoping rule that fires, in declared order
    pub fn first_violation(&self, operation: &str, arguments: &Map<String, Value>) -> Option<&ScopingRule> {
        self.scoping_rules
            .iter()
            .find(|rule| rule.predicate.matches(operation, arguments))
    }

    /// Argument keys any scoping rule would accept as narrowing
    pub fn narrowing_keys(&self) -> BTreeSet<&str> {
        self.scoping_rules
            .iter()
            .flat_map(|rule| rule.predicate.narrowing_keys())
            .collect()
    }

    /// Check an operation against the allowlist and the discovered tool set
    pub fn permits(&self, operation: &str) -> Result<(), String> {
        if !self.operations.contains(operation) {
            return Err(format!(
                "operation '{}' is not an allowed read-only operation of '{}'",
                operation, self.name
            ));
        }

        if let Some(tool_set) = &self.tool_set {
            if !tool_set.operations.contains(operation) {
                return Err(format!(
                    "operation '{}' is not advertised by the '{}' server",
                    operation, self.name
                ));
            }
        }

        Ok(())
    }
}
