//! Orchestrator
//!
//! One turn:
//!
//! 1. Ask the [`Classifier`] for a [`DispatchDecision`]
//! 2. A direct answer returns immediately; no selection asks which domain
//! 3. Dispatch the selected handlers, concurrently (`PARALLEL`) or in the
//!    listed order with earlier outcomes as context (`SEQUENTIAL`)
//! 4. Compose, with any clarification taking precedence over answers
//! 5. Record the turn in the session
//!
//! Every handler is bounded by its descriptor's turn budget, so a parallel
//! turn finishes within the largest budget and a sequential one within their
//! sum. Cancelling the turn drops every in-flight handler and tool call.

use futures::future::join_all;
use mcp_sdk::client::{Credential, ToolFailure, ToolInvoker, ToolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::{
    builtin_handler, describe_failure, CapabilityHandler, HandlerOutcome, HandlerRequest, PriorOutcome,
};
use crate::capabilities::{CapabilityDescriptor, CapabilityRegistry};
use crate::config::DocsConfig;
use crate::intelligence::{ClassificationRequest, Classifier, DispatchDecision, DispatchMode, Selection};
use crate::session::{SessionContext, SessionStore, TurnRecord};

pub mod synthesizer;

/// Result type for orchestration
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// The caller went away; nothing of the turn is returned
    #[error("turn cancelled")]
    Cancelled,
}

/// One user turn
#[derive(Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub conversation_id: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            auth_token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Bearer credential for this turn, if a non-blank token was given
    pub fn credential(&self) -> Option<Credential> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(Credential::bearer)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("conversation_id", &self.conversation_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What a turn returns to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedResponse {
    pub text: String,
    pub needs_clarification: bool,
}

impl ComposedResponse {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            needs_clarification: false,
        }
    }

    pub fn clarification(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            needs_clarification: true,
        }
    }
}

/// Routes turns to capability handlers
pub struct Orchestrator {
    registry: Arc<CapabilityRegistry>,
    handlers: HashMap<String, Arc<dyn CapabilityHandler>>,
    classifier: Arc<dyn Classifier>,
    sessions: Arc<SessionStore>,
}

impl Orchestrator {
    /// Orchestrator without handlers
    pub fn new(registry: Arc<CapabilityRegistry>, classifier: Arc<dyn Classifier>, sessions: Arc<SessionStore>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
            classifier,
            sessions,
        }
    }

    /// Register a handler under its capability name
    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.handlers.insert(handler.name().to_string(), handler);
        self
    }

    /// Register the built-in handler of every registered capability
    pub fn with_builtin_handlers(mut self, invoker: Arc<dyn ToolInvoker>, docs: &DocsConfig) -> Self {
        let descriptors: Vec<Arc<CapabilityDescriptor>> = self.registry.descriptors().cloned().collect();
        for descriptor in descriptors {
            let handler = builtin_handler(descriptor, invoker.clone(), docs);
            self.handlers.insert(handler.name().to_string(), handler);
        }
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run a turn with its conversation locked for the duration
    pub async fn handle_turn(&self, query: Query, cancel: CancellationToken) -> Result<ComposedResponse> {
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            session = self.sessions.lock(&query.conversation_id) => session,
        };
        self.route(&query, &mut session, cancel).await
    }

    /// Route one turn
    pub async fn route(
        &self,
        query: &Query,
        session: &mut SessionContext,
        cancel: CancellationToken,
    ) -> Result<ComposedResponse> {
        let started = Instant::now();
        let credential = query.credential();
        let presence = if credential.is_some() { "present" } else { "absent" };
        info!(conversation_id = %query.conversation_id, credential = presence, "Turn received");

        let request = ClassificationRequest::new(&query.text, &self.registry)
            .with_history(session.history(), session.pending_clarification.clone());

        let classified = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled),
            classified = self.classifier.classify(request) => classified,
        };

        let decision = match classified {
            Ok(decision) => decision.normalize(&self.registry),
            Err(e) => {
                warn!(error = %e, "Classification failed");
                let response = ComposedResponse::answer(format!(
                    "I couldn't work out how to handle that request ({}). Please try again.",
                    e
                ));
                session.record(
                    TurnRecord::new(&query.text, DispatchDecision::default(), &[], &response.text),
                    None,
                );
                return Ok(response);
            }
        };

        if let Some(answer) = decision.direct_answer.clone() {
            debug!("Answering directly");
            let response = ComposedResponse::answer(answer);
            session.record(TurnRecord::new(&query.text, decision, &[], &response.text), None);
            return Ok(response);
        }

        if decision.selected.is_empty() {
            debug!("No capability selected, asking for the domain");
            let response = synthesizer::domain_clarification(&self.registry);
            session.record(
                TurnRecord::new(&query.text, decision, &[], &response.text),
                Some(response.text.clone()),
            );
            return Ok(response);
        }

        info!(selected = ?decision.names(), mode = ?decision.mode, "Dispatching");

        let dispatch = async {
            match decision.mode {
                DispatchMode::Parallel => self.dispatch_parallel(&query.text, &decision.selected, &credential).await,
                DispatchMode::Sequential => {
                    self.dispatch_sequential(&query.text, &decision.selected, &credential).await
                }
            }
        };

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(conversation_id = %query.conversation_id, "Turn cancelled");
                return Err(OrchestrationError::Cancelled);
            }
            outcomes = dispatch => outcomes,
        };

        let response = synthesizer::compose(&outcomes, &self.registry);
        info!(
            handlers = outcomes.len(),
            tool_calls = outcomes.iter().map(HandlerOutcome::tool_calls).sum::<usize>(),
            clarification = response.needs_clarification,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );

        let pending = response.needs_clarification.then(|| response.text.clone());
        session.record(TurnRecord::new(&query.text, decision, &outcomes, &response.text), pending);
        Ok(response)
    }

    /// All selections at once.
    ///
    /// Every run is bounded by its own turn budget in `run_handler`, so the
    /// join ends within the largest of them.
    async fn dispatch_parallel(
        &self,
        text: &str,
        selected: &[Selection],
        credential: &Option<Credential>,
    ) -> Vec<HandlerOutcome> {
        debug!(handlers = selected.len(), "Parallel dispatch");

        let runs = selected.iter().map(|selection| {
            let request = Self::request(text, selection, credential.clone(), Vec::new());
            self.run_handler(&selection.capability, request)
        });
        join_all(runs).await
    }

    /// In order, each handler seeing the earlier ones; stops at the first
    /// clarification
    async fn dispatch_sequential(
        &self,
        text: &str,
        selected: &[Selection],
        credential: &Option<Credential>,
    ) -> Vec<HandlerOutcome> {
        let mut outcomes = Vec::with_capacity(selected.len());
        let mut context: Vec<PriorOutcome> = Vec::new();

        for selection in selected {
            let request = Self::request(text, selection, credential.clone(), context.clone());
            let arguments = match self.handlers.get(&selection.capability) {
                Some(handler) => request.scoped_arguments(handler.descriptor()),
                None => request.arguments.clone(),
            };

            let outcome = self.run_handler(&selection.capability, request).await;
            let stop = outcome.needs_clarification;
            context.push(PriorOutcome {
                capability: outcome.capability_name.clone(),
                answer: outcome.answer.clone(),
                arguments,
            });
            outcomes.push(outcome);

            if stop {
                debug!(capability = %selection.capability, "Clarification needed, stopping sequence");
                break;
            }
        }
        outcomes
    }

    fn request(
        text: &str,
        selection: &Selection,
        credential: Option<Credential>,
        context: Vec<PriorOutcome>,
    ) -> HandlerRequest {
        let mut request = HandlerRequest::new(text)
            .with_arguments(selection.arguments.clone())
            .with_credential(credential)
            .with_context(context);
        request.operation = selection.operation.clone();
        request
    }

    /// Run one handler within its turn budget
    async fn run_handler(&self, capability: &str, request: HandlerRequest) -> HandlerOutcome {
        let Some(handler) = self.handlers.get(capability) else {
            warn!(capability, "No handler registered");
            return HandlerOutcome::answered(
                capability,
                format!("The {} capability is not available right now.", capability),
                Vec::new(),
            );
        };

        let descriptor = handler.descriptor().clone();
        let budget = descriptor.turn_budget();
        match tokio::time::timeout(budget, handler.handle(request)).await {
            Ok(outcome) => outcome,
            Err(_) => timed_out(&descriptor, budget),
        }
    }
}

fn timed_out(descriptor: &CapabilityDescriptor, budget: Duration) -> HandlerOutcome {
    warn!(capability = %descriptor.name, budget_ms = budget.as_millis() as u64, "Handler exceeded its turn budget");
    let failure = ToolFailure::transport(format!("no answer within {:?}", budget));
    HandlerOutcome::answered(
        &descriptor.name,
        describe_failure(descriptor, &failure),
        vec![ToolResult::Failure(failure)],
    )
}
