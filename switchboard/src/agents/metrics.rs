//! Metrics handler
//!
//! Every turn re-discovers before it queries:
//!
//! 1. `list_metrics`, and resolve the requested metric against the result
//! 2. `get_label_names` for that metric
//! 3. `get_label_values` for the first requested label, budget permitting
//! 4. `execute_instant_query` or `execute_range_query` with the discovered name
//!
//! A metric that discovery does not return is reported as a gap; no query is
//! built from a guessed name. Range queries are built by the
//! [`GraphProxy`] so its defaults always apply.

use async_trait::async_trait;
use mcp_sdk::client::{ToolFailure, ToolInvoker, ToolResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::lifecycle::{Done, Executing, HandlerRun, Scoped};
use super::{truncate, CapabilityHandler, HandlerOutcome, HandlerRequest};
use crate::capabilities::CapabilityDescriptor;
use crate::tools::graph::{GraphProxy, GraphRequest};
use crate::tools::promql;

/// Candidates listed when a metric name is ambiguous
const MAX_CANDIDATES: usize = 5;
const MAX_LISTED: usize = 50;
const MAX_SERIES: usize = 10;

/// Handler for obs-mcp
pub struct MetricsHandler {
    descriptor: Arc<CapabilityDescriptor>,
    invoker: Arc<dyn ToolInvoker>,
    graph: GraphProxy,
}

impl MetricsHandler {
    pub fn new(descriptor: Arc<CapabilityDescriptor>, invoker: Arc<dyn ToolInvoker>) -> Self {
        let graph = GraphProxy::for_capability(invoker.clone(), &descriptor);
        Self {
            descriptor,
            invoker,
            graph,
        }
    }
}

/// Outcome of matching a requested metric against discovered names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    Ambiguous(Vec<String>),
    Missing,
}

/// Exact name, else the unique discovered name containing the candidate
pub fn resolve_metric(candidate: &str, available: &[String]) -> Resolution {
    let candidate = candidate.trim();
    if let Some(exact) = available.iter().find(|name| name.as_str() == candidate) {
        return Resolution::Found(exact.clone());
    }

    let needle = candidate.to_lowercase();
    let matches: Vec<String> = available
        .iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    match matches.len() {
        0 => Resolution::Missing,
        1 => Resolution::Found(matches[0].clone()),
        _ => Resolution::Ambiguous(matches),
    }
}

/// Pull a list of names out of the shapes metrics servers return
pub fn name_list(payload: &Value) -> Vec<String> {
    fn names(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => map.get("name").and_then(Value::as_str).map(String::from),
                _ => None,
            })
            .collect()
    }

    match payload {
        Value::Array(items) => names(items),
        Value::Object(map) => ["metrics", "labels", "values", "names", "data", "result"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|items| names(items))
            .unwrap_or_default(),
        Value::String(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// Requested `label -> value` matchers
fn requested_labels(arguments: &Map<String, Value>) -> BTreeMap<String, String> {
    arguments
        .get("labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k.clone(), s.clone())),
                    Value::Number(n) => Some((k.clone(), n.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `metric{label="value",...}`, regex values as `=~`
pub fn compose_query(metric: &str, labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return metric.to_string();
    }
    let matchers: Vec<String> = labels
        .iter()
        .map(|(k, v)| {
            let op = if promql::is_regex_value(v) { "=~" } else { "=" };
            format!("{}{}\"{}\"", k, op, v.replace('\\', "\\\\").replace('"', "\\\""))
        })
        .collect();
    format!("{}{{{}}}", metric, matchers.join(","))
}

fn str_arg<'a>(arguments: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn render_labels(metric: &Value) -> String {
    let Some(labels) = metric.as_object() else {
        return "{}".to_string();
    };
    let name = labels.get("__name__").and_then(Value::as_str).unwrap_or("");
    let pairs: Vec<String> = labels
        .iter()
        .filter(|(k, _)| k.as_str() != "__name__")
        .map(|(k, v)| format!("{}=\"{}\"", k, v.as_str().unwrap_or_default()))
        .collect();
    format!("{}{{{}}}", name, pairs.join(", "))
}

fn sample_value(sample: &Value) -> Option<f64> {
    let value = sample.as_array()?.get(1)?;
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Summarize a Prometheus query result
pub fn summarize_result(payload: &Value) -> String {
    let result_type = payload.get("resultType").and_then(Value::as_str).unwrap_or("unknown");
    let series = payload
        .get("result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if series.is_empty() {
        return "The query returned no series.".to_string();
    }

    let mut lines = vec![format!("{} series ({}):", series.len(), result_type)];
    for entry in series.iter().take(MAX_SERIES) {
        let labels = render_labels(entry.get("metric").or_else(|| entry.get("labels")).unwrap_or(&Value::Null));
        match result_type {
            "vector" => {
                let value = entry.get("value").and_then(sample_value);
                lines.push(format!("- `{}` = {}", labels, value.map_or("n/a".to_string(), |v| v.to_string())));
            }
            _ => {
                let samples: Vec<f64> = entry
                    .get("values")
                    .or_else(|| entry.get("samples"))
                    .and_then(Value::as_array)
                    .map(|values| values.iter().filter_map(sample_value).collect())
                    .unwrap_or_default();
                match samples.last() {
                    Some(last) => {
                        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
                        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                        lines.push(format!(
                            "- `{}`: {} samples, latest {}, min {}, max {}",
                            labels,
                            samples.len(),
                            last,
                            min,
                            max
                        ));
                    }
                    None => lines.push(format!("- `{}`: no samples", labels)),
                }
            }
        }
    }
    if series.len() > MAX_SERIES {
        lines.push(format!("… and {} more", series.len() - MAX_SERIES));
    }
    lines.join("\n")
}

fn list_names(heading: &str, names: &[String]) -> String {
    if names.is_empty() {
        return format!("{}: none.", heading);
    }
    let shown: Vec<&str> = names.iter().take(MAX_LISTED).map(String::as_str).collect();
    let mut text = format!("{} ({}): {}", heading, names.len(), shown.join(", "));
    if names.len() > MAX_LISTED {
        text.push_str(", …");
    }
    text
}

impl MetricsHandler {
    async fn execute(&self, mut run: HandlerRun<Executing>) -> HandlerRun<Done> {
        let operation = run.operation.clone();
        let arguments = run.arguments.clone();
        let invoker = self.invoker.as_ref();

        // 1. Metric names
        let listed = run.invoke(invoker, "list_metrics", Map::new()).await;
        let available = match listed {
            ToolResult::Success(payload) => name_list(&payload),
            ToolResult::Failure(failure) => return run.fail(&failure),
        };
        debug!(metrics = available.len(), "Discovered metric names");

        if operation == "list_metrics" {
            let filtered: Vec<String> = match str_arg(&arguments, "metric") {
                Some(filter) => {
                    let filter = filter.to_lowercase();
                    available.iter().filter(|m| m.to_lowercase().contains(&filter)).cloned().collect()
                }
                None => available,
            };
            return run.answer(list_names("Available metrics", &filtered));
        }

        let query = str_arg(&arguments, "query").map(String::from);
        let metric = match (str_arg(&arguments, "metric"), &query) {
            (Some(candidate), _) => match resolve_metric(candidate, &available) {
                Resolution::Found(name) => Some(name),
                Resolution::Ambiguous(matches) => {
                    let shown: Vec<&str> = matches.iter().take(MAX_CANDIDATES).map(String::as_str).collect();
                    return run.clarify(format!(
                        "Several metrics match `{}`: {}. Which one do you mean?",
                        candidate,
                        shown.join(", ")
                    ));
                }
                Resolution::Missing => {
                    return run.answer(format!(
                        "I couldn't find a metric matching `{}` among the {} metrics the server exposes, \
                         so I didn't run a query.",
                        candidate,
                        available.len()
                    ));
                }
            },
            (None, Some(query)) => {
                let referenced = promql::identifiers(query).into_iter().find(|ident| available.contains(ident));
                match referenced {
                    Some(name) => Some(name),
                    None => {
                        return run.answer(format!(
                            "The query `{}` doesn't reference any metric the server exposes, so I didn't run it.",
                            query
                        ));
                    }
                }
            }
            (None, None) => None,
        };

        if let (Some(name), Some(query)) = (&metric, &query) {
            if !promql::identifiers(query).iter().any(|ident| ident == name) {
                return run.answer(format!(
                    "The query `{}` doesn't use the discovered metric `{}`, so I didn't run it.",
                    query, name
                ));
            }
        }

        // 2. Label names
        let mut label_arguments = Map::new();
        if let Some(name) = &metric {
            label_arguments.insert("metric".to_string(), Value::String(name.clone()));
        }
        let listed = run.invoke(invoker, "get_label_names", label_arguments).await;
        let label_names = match listed {
            ToolResult::Success(payload) => name_list(&payload),
            ToolResult::Failure(failure) => return run.fail(&failure),
        };

        if operation == "get_label_names" {
            let heading = match &metric {
                Some(name) => format!("Labels of `{}`", name),
                None => "Labels".to_string(),
            };
            return run.answer(list_names(&heading, &label_names));
        }

        let labels = requested_labels(&arguments);
        let unknown: Vec<&str> = labels
            .keys()
            .filter(|label| !label_names.is_empty() && !label_names.contains(label))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return run.answer(format!(
                "`{}` has no label {}. Available labels: {}.",
                metric.as_deref().unwrap_or("the metric"),
                unknown.join(", "),
                label_names.join(", ")
            ));
        }

        // 3. Label values
        if operation == "get_label_values" {
            let Some(label) = str_arg(&arguments, "label")
                .map(String::from)
                .or_else(|| labels.keys().next().cloned())
            else {
                return run.clarify(format!(
                    "Which label's values do you want? Available labels: {}.",
                    label_names.join(", ")
                ));
            };
            let listed = self.label_values(&mut run, &label, metric.as_deref()).await;
            let values = match listed {
                ToolResult::Success(payload) => name_list(&payload),
                ToolResult::Failure(failure) => return run.fail(&failure),
            };
            return run.answer(list_names(&format!("Values of `{}`", label), &values));
        }

        let Some(metric) = metric else {
            // Scoping guarantees a metric or a query for query operations
            return run.clarify("Which metric should I look at?");
        };

        if let Some((label, value)) = labels.iter().next() {
            if !promql::is_regex_value(value) && run.remaining_calls() >= 2 {
                let listed = self.label_values(&mut run, label, Some(&metric)).await;
                if let ToolResult::Success(payload) = listed {
                    let known = name_list(&payload);
                    if !known.is_empty() && !known.contains(value) {
                        let shown: Vec<&str> = known.iter().take(MAX_LISTED).map(String::as_str).collect();
                        return run.answer(format!(
                            "No `{}` series has {}=\"{}\". Known values: {}.",
                            metric,
                            label,
                            value,
                            shown.join(", ")
                        ));
                    }
                }
            }
        }

        // 4. Query
        let query = query.unwrap_or_else(|| compose_query(&metric, &labels));
        info!(capability = %self.descriptor.name, %operation, %query, "Running metrics query");

        if operation == "execute_instant_query" {
            let mut query_arguments = Map::new();
            query_arguments.insert("query".to_string(), Value::String(query.clone()));
            if let Some(time) = str_arg(&arguments, "time") {
                query_arguments.insert("time".to_string(), Value::String(time.to_string()));
            }
            let result = run.invoke(invoker, "execute_instant_query", query_arguments).await;
            return match result {
                ToolResult::Success(payload) => {
                    let answer = format!("Query: `{}`\n\n{}", query, summarize_result(&payload));
                    run.answer(answer)
                }
                ToolResult::Failure(failure) => run.fail(&failure),
            };
        }

        if operation != "execute_range_query" {
            return run.fail(&ToolFailure::rejected(format!(
                "operation '{}' is not a metrics query",
                operation
            )));
        }

        let request = GraphRequest {
            query: query.clone(),
            description: str_arg(&arguments, "description")
                .map(String::from)
                .unwrap_or_else(|| format!("{} over time", metric)),
            start: str_arg(&arguments, "start").map(String::from),
            end: str_arg(&arguments, "end").map(String::from),
            step: str_arg(&arguments, "step").map(String::from),
        };
        let call = self.graph.range_call(&request, None);
        let window = format!(
            "{} to {}, step {}",
            call.str_arg("start").unwrap_or_default(),
            call.str_arg("end").unwrap_or_default(),
            call.str_arg("step").unwrap_or_default()
        );

        let result = run.submit(invoker, call).await;
        match result {
            ToolResult::Success(payload) => {
                let answer = format!(
                    "Query: `{}` ({})\n\n{}",
                    query,
                    window,
                    truncate(&summarize_result(&payload), 4000)
                );
                run.answer(answer)
            }
            ToolResult::Failure(failure) => run.fail(&failure),
        }
    }

    async fn label_values(&self, run: &mut HandlerRun<Executing>, label: &str, metric: Option<&str>) -> ToolResult {
        let mut arguments = Map::new();
        arguments.insert("label".to_string(), Value::String(label.to_string()));
        if let Some(metric) = metric {
            arguments.insert("metric".to_string(), Value::String(metric.to_string()));
        }
        run.invoke(self.invoker.as_ref(), "get_label_values", arguments).await
    }
}

#[async_trait]
impl CapabilityHandler for MetricsHandler {
    fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    async fn handle(&self, request: HandlerRequest) -> HandlerOutcome {
        let arguments = request.scoped_arguments(&self.descriptor);
        let operation = request.operation_or_default(&self.descriptor);

        let run = HandlerRun::new(self.descriptor.clone(), operation, arguments, request.credential);
        match run.scope() {
            Scoped::Clarify(run) => run.finish().into_outcome(),
            Scoped::Reject(run) => run.into_outcome(),
            Scoped::Execute(run) => self.execute(run).await.into_outcome(),
        }
    }
}
