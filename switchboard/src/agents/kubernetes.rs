//! Cluster resource handler

use async_trait::async_trait;
use mcp_sdk::client::{ToolInvoker, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use super::lifecycle::{HandlerRun, Scoped};
use super::{render_arguments, truncate, CapabilityHandler, HandlerOutcome, HandlerRequest};
use crate::capabilities::{is_present, CapabilityDescriptor};

/// Longest tool output quoted in an answer
const MAX_OUTPUT_CHARS: usize = 6000;

/// Handler for kubernetes-mcp-server
pub struct KubernetesHandler {
    descriptor: Arc<CapabilityDescriptor>,
    invoker: Arc<dyn ToolInvoker>,
}

impl KubernetesHandler {
    pub fn new(descriptor: Arc<CapabilityDescriptor>, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { descriptor, invoker }
    }
}

/// Pick the narrowest pod operation the arguments allow.
///
/// `pods_list` spans every namespace; with a namespace it becomes
/// `pods_list_in_namespace`, with only a pod name it becomes `pods_get`.
fn refine(operation: &str, arguments: &Map<String, Value>) -> String {
    let has = |key: &str| is_present(arguments.get(key));
    match operation {
        "pods_list" if has("namespace") => "pods_list_in_namespace".to_string(),
        "pods_list" | "pods_list_in_namespace" if has("name") && !has("namespace") => "pods_get".to_string(),
        other => other.to_string(),
    }
}

fn render_output(operation: &str, arguments: &Map<String, Value>, payload: &Value) -> String {
    let text = match payload {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    let scope = render_arguments(arguments);
    let heading = if scope.is_empty() {
        format!("`{}`:", operation)
    } else {
        format!("`{}` ({}):", operation, scope)
    };

    if text.trim().is_empty() {
        return format!("{} nothing found.", heading);
    }

    format!("{}\n\n```\n{}\n```", heading, truncate(text.trim_end(), MAX_OUTPUT_CHARS))
}

#[async_trait]
impl CapabilityHandler for KubernetesHandler {
    fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    async fn handle(&self, request: HandlerRequest) -> HandlerOutcome {
        let arguments = request.scoped_arguments(&self.descriptor);
        let operation = refine(&request.operation_or_default(&self.descriptor), &arguments);

        let run = HandlerRun::new(self.descriptor.clone(), operation, arguments, request.credential);
        let mut run = match run.scope() {
            Scoped::Clarify(run) => return run.finish().into_outcome(),
            Scoped::Reject(run) => return run.into_outcome(),
            Scoped::Execute(run) => run,
        };

        let operation = run.operation.clone();
        let arguments = run.arguments.clone();
        info!(capability = %self.descriptor.name, %operation, "Inspecting cluster");

        let result = run.invoke(self.invoker.as_ref(), &operation, arguments.clone()).await;
        let done = match result {
            ToolResult::Success(payload) => {
                let answer = render_output(&operation, &arguments, &payload);
                run.answer(answer)
            }
            ToolResult::Failure(failure) => run.fail(&failure),
        };

        done.into_outcome()
    }
}
