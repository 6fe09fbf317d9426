//! Common test utilities for Switchboard tests
//!
//! Provides a scripted tool invoker standing in for the capability servers,
//! a scripted classifier, and a delaying handler for dispatch timing tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_sdk::prelude::*;
use switchboard::agents::{CapabilityHandler, HandlerOutcome, HandlerRequest};
use switchboard::capabilities::{CapabilityDescriptor, CapabilityRegistry};
use switchboard::config::{DocsConfig, SwitchboardConfig};
use switchboard::intelligence::{ClassificationRequest, Classifier, ClassifierError, DispatchDecision};
use switchboard::orchestration::Orchestrator;
use switchboard::session::SessionStore;

// ============================================================================
// Scripted tool invoker
// ============================================================================

/// Replies to tool calls by operation name and records every call
pub struct MockInvoker {
    replies: Mutex<HashMap<String, ToolResult>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<ToolCall>>,
    reachable: bool,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            reachable: true,
        }
    }

    /// Every call and every discovery fails at the transport
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    pub fn reply(self, operation: &str, payload: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(operation.to_string(), ToolResult::Success(payload));
        self
    }

    pub fn fail(self, operation: &str, failure: ToolFailure) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(operation.to_string(), ToolResult::Failure(failure));
        self
    }

    pub fn delay(self, operation: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(operation.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.operation).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolInvoker for MockInvoker {
    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        self.calls.lock().unwrap().push(call.clone());

        let delay = self.delays.lock().unwrap().get(&call.operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.reachable {
            return ToolResult::Failure(ToolFailure::transport("connection refused"));
        }

        self.replies
            .lock()
            .unwrap()
            .get(&call.operation)
            .cloned()
            .unwrap_or_else(|| ToolResult::Success(json!([])))
    }

    async fn list_tools(
        &self,
        _endpoint: &str,
        _credential: Option<&Credential>,
        _timeout: Duration,
    ) -> Result<Vec<ToolDefinition>, ToolFailure> {
        if !self.reachable {
            return Err(ToolFailure::transport("connection refused"));
        }
        // Advertise every operation the built-in capabilities allow, plus a
        // mutating one that must never be exposed
        let registry = CapabilityRegistry::from_config(&SwitchboardConfig::default());
        let mut tools: Vec<ToolDefinition> = registry
            .descriptors()
            .flat_map(|d| d.operations.iter().map(ToolDefinition::new).collect::<Vec<_>>())
            .collect();
        tools.push(ToolDefinition::new("pods_delete"));
        Ok(tools)
    }
}

// ============================================================================
// Scripted classifier
// ============================================================================

/// Returns queued decisions in order, then repeats the last one
pub struct ScriptedClassifier {
    decisions: Mutex<VecDeque<Result<DispatchDecision, ClassifierError>>>,
    last: Mutex<Option<DispatchDecision>>,
    requests: Mutex<Vec<ClassificationRequest>>,
}

impl ScriptedClassifier {
    pub fn new(decisions: Vec<DispatchDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().map(Ok).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(decision: DispatchDecision) -> Self {
        Self::new(vec![decision])
    }

    pub fn failing(error: ClassifierError) -> Self {
        Self {
            decisions: Mutex::new(VecDeque::from(vec![Err(error)])),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ClassificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: ClassificationRequest) -> Result<DispatchDecision, ClassifierError> {
        self.requests.lock().unwrap().push(request);

        let next = self.decisions.lock().unwrap().pop_front();
        match next {
            Some(Ok(decision)) => {
                *self.last.lock().unwrap() = Some(decision.clone());
                Ok(decision)
            }
            Some(Err(error)) => Err(error),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ClassifierError::NotConfigured("no scripted decision".to_string())),
        }
    }
}

// ============================================================================
// Delaying handler
// ============================================================================

/// Sets its flag when dropped
pub struct DropProbe(pub Arc<AtomicBool>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Handler that sleeps, then answers with a fixed text
pub struct SlowHandler {
    pub descriptor: Arc<CapabilityDescriptor>,
    pub delay: Duration,
    pub answer: String,
    pub started: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicBool>,
}

impl SlowHandler {
    pub fn new(descriptor: Arc<CapabilityDescriptor>, delay: Duration, answer: &str) -> Self {
        Self {
            descriptor,
            delay,
            answer: answer.to_string(),
            started: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl CapabilityHandler for SlowHandler {
    fn descriptor(&self) -> &Arc<CapabilityDescriptor> {
        &self.descriptor
    }

    async fn handle(&self, _request: HandlerRequest) -> HandlerOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        let probe = DropProbe(self.dropped.clone());
        tokio::time::sleep(self.delay).await;
        std::mem::forget(probe);
        HandlerOutcome::answered(&self.descriptor.name, &self.answer, Vec::new())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Registry of the four built-in capabilities, undiscovered
pub fn registry() -> Arc<CapabilityRegistry> {
    Arc::new(CapabilityRegistry::from_config(&SwitchboardConfig::default()))
}

pub fn sessions() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Duration::from_secs(600), 20))
}

/// Orchestrator running the built-in handlers against `invoker`
pub fn orchestrator(invoker: Arc<MockInvoker>, classifier: Arc<ScriptedClassifier>) -> Orchestrator {
    Orchestrator::new(registry(), classifier, sessions()).with_builtin_handlers(invoker, &DocsConfig::default())
}

/// Descriptor of a built-in capability
pub fn descriptor(name: &str) -> CapabilityDescriptor {
    registry()
        .get(name)
        .map(|d| d.as_ref().clone())
        .unwrap_or_else(|| panic!("no built-in capability {}", name))
}

/// The first call of `operation`
pub fn call_of(invoker: &MockInvoker, operation: &str) -> Option<ToolCall> {
    invoker.calls().into_iter().find(|call| call.operation == operation)
}
