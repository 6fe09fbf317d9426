//! Chat-completion classifier
//!
//! Asks an OpenAI-compatible model for a dispatch decision in JSON mode.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use super::{
    CapabilitySummary, ClassificationRequest, Classifier, ClassifierError, DispatchDecision, DispatchMode,
    Selection,
};
use crate::config::ClassifierConfig;

const ROUTING_GUIDANCE: &str = "\
You route questions about an OpenShift/Kubernetes cluster to specialised, read-only capabilities.

Reply with a single JSON object and nothing else:
{\"selected\": [{\"capability\": \"<name>\", \"operation\": \"<operation>\", \"arguments\": {...}}],
 \"mode\": \"PARALLEL\" | \"SEQUENTIAL\",
 \"direct_answer\": \"<text>\" | null}

Rules:
- Select capabilities only by the names listed below, and operations only from their lists.
- Put every detail the user gave (namespace, name, kind, metric, labels, time range) into \"arguments\".
  Do not invent values the user did not give; the capability will ask for what is missing.
- Questions about alerts, \"what is firing\" or cluster health go to BOTH metrics and incidents with mode PARALLEL.
- Use PARALLEL when capabilities hold independent data. Use SEQUENTIAL when a later capability needs the \
earlier one's answer, for example documentation first and then inspecting the cluster.
- Greetings, questions about what you can do and general concepts that need no cluster access get a
  \"direct_answer\" and an empty \"selected\" list. How-to questions about OpenShift go to docs.
- If the question is too vague to route, select nothing and leave \"direct_answer\" null.
- Assume questions are about OpenShift unless the user says otherwise.";

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Selection as models actually write it: a bare name or a full object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSelection {
    Name(String),
    Full {
        #[serde(alias = "name")]
        capability: String,
        #[serde(default)]
        operation: Option<String>,
        #[serde(default)]
        arguments: Option<Map<String, Value>>,
    },
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    selected: Vec<RawSelection>,
    #[serde(default)]
    mode: Option<DispatchMode>,
    #[serde(default)]
    direct_answer: Option<String>,
}

/// Classifier backed by a chat-completion endpoint
pub struct LlmClassifier {
    http: HttpClient,
    endpoint: String,
    model: String,
    api_key: String,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ClassifierError::NotConfigured("no API key".to_string()))?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Routing guidance followed by the registered capabilities
    pub fn system_prompt(capabilities: &[CapabilitySummary]) -> String {
        let mut prompt = String::from(ROUTING_GUIDANCE);
        prompt.push_str("\n\nCapabilities:\n");
        for capability in capabilities {
            prompt.push_str(&format!(
                "- {} ({}): {}\n  operations: {}\n",
                capability.name,
                capability.domain.title(),
                capability.description,
                capability.operations.join(", ")
            ));
        }
        prompt
    }

    /// System prompt, earlier turns, then the query
    pub fn messages(request: &ClassificationRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::new("system", Self::system_prompt(&request.capabilities))];

        for entry in &request.history {
            messages.push(ChatMessage::new("user", entry.query.clone()));
            messages.push(ChatMessage::new("assistant", entry.response.clone()));
        }

        if let Some(pending) = &request.pending_clarification {
            messages.push(ChatMessage::new(
                "system",
                format!(
                    "Your last reply asked the user: \"{}\". Their next message most likely answers it; \
                     combine it with the earlier question when routing.",
                    pending
                ),
            ));
        }

        messages.push(ChatMessage::new("user", request.query.clone()));
        messages
    }

    /// Decode the model's reply, tolerating code fences and bare names
    pub fn parse_decision(content: &str) -> Result<DispatchDecision, ClassifierError> {
        let trimmed = content.trim();
        let json = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|rest| rest.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();

        let raw: RawDecision = serde_json::from_str(json)?;
        let selected = raw
            .selected
            .into_iter()
            .map(|selection| match selection {
                RawSelection::Name(name) => Selection::new(name),
                RawSelection::Full {
                    capability,
                    operation,
                    arguments,
                } => Selection {
                    capability,
                    operation: operation.filter(|op| !op.trim().is_empty()),
                    arguments: arguments.unwrap_or_default(),
                },
            })
            .collect();

        Ok(DispatchDecision {
            selected,
            mode: raw.mode.unwrap_or_default(),
            direct_answer: raw.direct_answer,
        })
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, request: ClassificationRequest) -> Result<DispatchDecision, ClassifierError> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::messages(&request),
            response_format: ResponseFormat { kind: "json_object" },
        };

        let url = format!("{}/chat/completions", self.endpoint);
        debug!(%url, model = %self.model, history = request.history.len(), "Classifying query");

        let response = self.http.post(&url).bearer_auth(&self.api_key).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::InvalidResponse("no message content".to_string()))?;

        let decision = Self::parse_decision(&content)?;
        debug!(selected = ?decision.names(), mode = ?decision.mode, direct = decision.direct_answer.is_some(), "Classified");
        Ok(decision)
    }
}
