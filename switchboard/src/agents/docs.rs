//! Documentation search handler
//!
//! Every search is restricted to the configured documentation site.

use async_trait::async_trait;
use mcp_sdk::client::{ToolInvoker, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{HandlerRun, Scoped};
use super::{truncate, CapabilityHandler, HandlerOutcome, HandlerRequest};
use crate::capabilities::{is_present, CapabilityDescriptor};

const MAX_RESULTS: usize = 5;
const MAX_TEXT_CHARS: usize = 4000;

/// Handler for the documentation search server
pub struct DocsHandler {
    descriptor: Arc<CapabilityDescriptor>,
    invoker: Arc<dyn ToolInvoker>,
    site_filter: String,
}

impl DocsHandler {
    pub fn new(
        descriptor: Arc<CapabilityDescriptor>,
        invoker: Arc<dyn ToolInvoker>,
        site_filter: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            invoker,
            site_filter: site_filter.into(),
        }
    }

    /// Search string sent to the server
    pub fn search_query(&self, question: &str) -> String {
        let filter = self.site_filter.trim();
        if filter.is_empty() {
            question.trim().to_string()
        } else {
            format!("{} {}", filter, question.trim())
        }
    }
}

/// Render search hits, or the raw text the server returned
pub fn render_results(payload: &Value) -> String {
    let parsed;
    let payload = match payload {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value @ (Value::Array(_) | Value::Object(_))) => {
                parsed = value;
                &parsed
            }
            _ => return render_text(text),
        },
        other => other,
    };

    let hits: &[Value] = match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("results")
            .or_else(|| map.get("items"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    if hits.is_empty() {
        return "I found nothing relevant in the documentation.".to_string();
    }

    let field = |hit: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|key| hit.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let mut lines = vec!["From the documentation:".to_string()];
    for hit in hits.iter().take(MAX_RESULTS) {
        let title = field(hit, &["title", "name"]);
        let link = field(hit, &["url", "link"]);
        let snippet = field(hit, &["snippet", "summary", "content"]);

        let mut line = match (title.is_empty(), link.is_empty()) {
            (false, false) => format!("- [{}]({})", title, link),
            (false, true) => format!("- {}", title),
            (true, false) => format!("- <{}>", link),
            (true, true) => "-".to_string(),
        };
        if !snippet.is_empty() {
            line.push_str(": ");
            line.push_str(&snippet);
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn render_text(text: &str) -> String {
    if text.trim().is_empty() {
        return "I found nothing relevant in the documentation.".to_string();
    }
    truncate(text.trim(), MAX_TEXT_CHARS)
}

#[async_trait]
impl CapabilityHandler for DocsHandler {
    fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    async fn handle(&self, request: HandlerRequest) -> HandlerOutcome {
        let mut arguments = request.scoped_arguments(&self.descriptor);
        if !is_present(arguments.get("question")) && !request.query.trim().is_empty() {
            arguments.insert("question".to_string(), Value::String(request.query.trim().to_string()));
        }
        let operation = request.operation_or_default(&self.descriptor);

        let run = HandlerRun::new(self.descriptor.clone(), operation, arguments, request.credential);
        let mut run = match run.scope() {
            Scoped::Clarify(run) => return run.finish().into_outcome(),
            Scoped::Reject(run) => return run.into_outcome(),
            Scoped::Execute(run) => run,
        };

        let question = run
            .arguments
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut search = Map::new();
        search.insert("query".to_string(), Value::String(self.search_query(&question)));
        info!(capability = %self.descriptor.name, %question, "Searching documentation");

        let operation = run.operation.clone();
        let result = run.invoke(self.invoker.as_ref(), &operation, search).await;
        let done = match result {
            ToolResult::Success(payload) => {
                let answer = render_results(&payload);
                run.answer(answer)
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
    fn test_render_hits() {
        let text = render_results(&json!({
            "results": [
                {"title": "Installing Operators", "url": "https://docs.example/operators", "snippet": "Use OperatorHub."},
                {"link": "https://docs.example/storage"}
            ]
        }));
        assert_eq!(
            text,
            "From the documentation:\n\
             - [Installing Operators](https://docs.example/operators): Use OperatorHub.\n\
             - <https://docs.example/storage>"
        );
    }

    #[test]
    fn test_render_json_in_text() {
        let text = render_results(&json!(r#"[{"title": "Monitoring"}]"#));
        assert_eq!(text, "From the documentation:\n- Monitoring");
    }

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render_results(&json!("  Persistent volumes are ...  ")), "Persistent volumes are ...");
        assert_eq!(render_results(&json!("")), "I found nothing relevant in the documentation.");
    }
}
