//! Cluster health incident handler

use async_trait::async_trait;
use mcp_sdk::client::{ToolInvoker, ToolResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{HandlerRun, Scoped};
use super::{CapabilityHandler, HandlerOutcome, HandlerRequest};
use crate::capabilities::CapabilityDescriptor;

/// Incidents detailed in one answer
const MAX_INCIDENTS: usize = 10;

/// Handler for cluster-health-mcp-server
pub struct IncidentsHandler {
    descriptor: Arc<CapabilityDescriptor>,
    invoker: Arc<dyn ToolInvoker>,
}

impl IncidentsHandler {
    pub fn new(descriptor: Arc<CapabilityDescriptor>, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { descriptor, invoker }
    }
}

/// One detected incident, fields read leniently
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub severity: String,
    pub components: Vec<String>,
    pub symptoms: Option<String>,
    pub root_cause: Option<String>,
    pub remediation: Option<String>,
}

fn first_str(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match entry.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Array(items)) if !items.is_empty() => Some(
            items
                .iter()
                .map(|item| item.as_str().map(String::from).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    })
}

fn string_items(entry: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| entry.get(*key))
        .map(|value| match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => first_str(item, &["name", "component"]),
                    _ => None,
                })
                .collect(),
            Value::String(s) => vec![s.clone()],
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

impl Incident {
    fn from_value(index: usize, entry: &Value) -> Self {
        let id = first_str(entry, &["id", "incident_id", "group_id"]).unwrap_or_else(|| (index + 1).to_string());
        Self {
            title: first_str(entry, &["title", "name", "summary", "alertname"]).unwrap_or_else(|| format!("Incident {}", id)),
            id,
            severity: first_str(entry, &["severity", "level"])
                .unwrap_or_else(|| "unknown".to_string())
                .to_lowercase(),
            components: string_items(entry, &["affected_components", "components", "component"]),
            symptoms: first_str(entry, &["symptoms", "description", "message"]),
            root_cause: first_str(entry, &["root_cause", "cause"]),
            remediation: first_str(entry, &["remediation", "suggested_remediation", "recommendation"]),
        }
    }
}

fn severity_rank(severity: &str) -> u8 {
    match severity {
        "critical" => 0,
        "warning" => 1,
        "info" => 2,
        _ => 3,
    }
}

/// Incidents in the payload, most severe first
pub fn parse_incidents(payload: &Value) -> Vec<Incident> {
    let entries = match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get("incidents")
            .or_else(|| map.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut incidents: Vec<Incident> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Incident::from_value(index, entry))
        .collect();
    incidents.sort_by_key(|incident| severity_rank(&incident.severity));
    incidents
}

/// Summary, then one block per incident
pub fn render_incidents(incidents: &[Incident]) -> String {
    if incidents.is_empty() {
        return "No incidents detected; the cluster looks healthy.".to_string();
    }

    let mut by_severity: BTreeMap<u8, (&str, usize)> = BTreeMap::new();
    for incident in incidents {
        by_severity
            .entry(severity_rank(&incident.severity))
            .or_insert((incident.severity.as_str(), 0))
            .1 += 1;
    }
    let breakdown: Vec<String> = by_severity
        .values()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();

    let noun = if incidents.len() == 1 { "incident" } else { "incidents" };
    let mut sections = vec![format!(
        "I found {} active {} ({}).",
        incidents.len(),
        noun,
        breakdown.join(", ")
    )];

    for incident in incidents.iter().take(MAX_INCIDENTS) {
        let mut lines = vec![format!(
            "**{} ({})**",
            incident.title,
            incident.severity.to_uppercase()
        )];
        if !incident.components.is_empty() {
            lines.push(format!("- Affected: {}", incident.components.join(", ")));
        }
        if let Some(symptoms) = &incident.symptoms {
            lines.push(format!("- Symptoms: {}", symptoms));
        }
        if let Some(cause) = &incident.root_cause {
            lines.push(format!("- Root cause: {}", cause));
        }
        if let Some(remediation) = &incident.remediation {
            lines.push(format!("- Remediation: {}", remediation));
        }
        sections.push(lines.join("\n"));
    }

    if incidents.len() > MAX_INCIDENTS {
        sections.push(format!("… and {} more.", incidents.len() - MAX_INCIDENTS));
    }

    sections.join("\n\n")
}

#[async_trait]
impl CapabilityHandler for IncidentsHandler {
    fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    async fn handle(&self, request: HandlerRequest) -> HandlerOutcome {
        let arguments = request.scoped_arguments(&self.descriptor);
        let operation = request.operation_or_default(&self.descriptor);

        let run = HandlerRun::new(self.descriptor.clone(), operation, arguments, request.credential);
        let mut run = match run.scope() {
            Scoped::Clarify(run) => return run.finish().into_outcome(),
            Scoped::Reject(run) => return run.into_outcome(),
            Scoped::Execute(run) => run,
        };

        let operation = run.operation.clone();
        let arguments = run.arguments.clone();
        let result = run.invoke(self.invoker.as_ref(), &operation, arguments).await;
        let done = match result {
            ToolResult::Success(payload) => {
                let incidents = parse_incidents(&payload);
                info!(capability = %self.descriptor.name, count = incidents.len(), "Incidents retrieved");
                run.answer(render_incidents(&incidents))
            }
            ToolResult::Failure(failure) => run.fail(&failure),
        };

        done.into_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sorts_by_severity() {
        let incidents = parse_incidents(&json!({
            "incidents": [
                {"id": "b", "title": "API latency", "severity": "warning"},
                {"id": "a", "title": "etcd memory", "severity": "CRITICAL",
                 "affected_components": ["etcd"], "root_cause": "limits too low"}
            ]
        }));

        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents[0].id, "a");
        assert_eq!(incidents[0].severity, "critical");
        assert_eq!(incidents[0].components, vec!["etcd".to_string()]);
        assert_eq!(incidents[1].id, "b");
    }

    #[test]
    fn test_render() {
        let incidents = parse_incidents(&json!([
            {"title": "etcd memory", "severity": "critical", "symptoms": "OOMKills"},
            {"title": "API latency", "severity": "warning"},
            {"title": "Slow disk", "severity": "warning"}
        ]));
        let text = render_incidents(&incidents);

        assert!(text.starts_with("I found 3 active incidents (1 critical, 2 warning)."));
        assert!(text.contains("**etcd memory (CRITICAL)**\n- Symptoms: OOMKills"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(
            render_incidents(&parse_incidents(&json!({"incidents": []}))),
            "No incidents detected; the cluster looks healthy."
        );
    }
}
