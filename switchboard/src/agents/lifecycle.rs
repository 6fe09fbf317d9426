//! Handler Lifecycle
//!
//! Compile-time state machine for one handler invocation:
//!
//! ```text
//! RECEIVED ──scope()──┬──> CLARIFY ───finish()──┐
//!                     ├──> EXECUTING ─answer()──┤
//!                     └─────────────────────────┴──> DONE (rejected)
//! ```
//!
//! Tools can only be invoked from [`HandlerRun<Executing>`], which is only
//! reachable when the requested operation is allowed and no scoping rule
//! fired. Every invocation is checked against
//! the descriptor's read-only allowlist and call budget before it reaches the
//! network.

use mcp_sdk::client::{Credential, FailureKind, ToolCall, ToolFailure, ToolInvoker, ToolResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{describe_failure, HandlerOutcome};
use crate::capabilities::CapabilityDescriptor;

/// Sealed trait to prevent external state implementations
mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Received {}
    impl Sealed for super::Clarifying {}
    impl Sealed for super::Executing {}
    impl Sealed for super::Done {}
}

/// Base trait for run states
pub trait RunState: sealed::Sealed + Send {}

/// Request received, scoping not yet checked
pub struct Received;
impl RunState for Received {}

/// A scoping rule fired
pub struct Clarifying {
    pub prompt: String,
}
impl RunState for Clarifying {}

/// Scoping passed; tools may be invoked
pub struct Executing {
    pub evidence: Vec<ToolResult>,
    pub calls: u32,
}
impl RunState for Executing {}

/// Outcome decided
pub struct Done {
    pub outcome: HandlerOutcome,
}
impl RunState for Done {}

/// One handler invocation with compile-time state
pub struct HandlerRun<S: RunState> {
    pub descriptor: Arc<CapabilityDescriptor>,
    pub operation: String,
    pub arguments: Map<String, Value>,
    credential: Option<Credential>,
    pub state: S,
}

/// Result of the scoping check
pub enum Scoped {
    Clarify(HandlerRun<Clarifying>),
    Execute(HandlerRun<Executing>),
    /// The operation is not an allowed read-only operation
    Reject(HandlerRun<Done>),
}

impl HandlerRun<Received> {
    /// Start a run.
    ///
    /// The credential is moved into the descriptor's auth header.
    pub fn new(
        descriptor: Arc<CapabilityDescriptor>,
        operation: impl Into<String>,
        arguments: Map<String, Value>,
        credential: Option<Credential>,
    ) -> Self {
        let credential = credential.map(|c| c.rehome(&descriptor.auth_header));
        Self {
            descriptor,
            operation: operation.into(),
            arguments,
            credential,
            state: Received,
        }
    }

    /// Check the operation against the allowlist, then evaluate scoping
    /// rules in declared order; the first match wins
    pub fn scope(self) -> Scoped {
        if let Err(detail) = self.descriptor.permits(&self.operation) {
            let failure = ToolFailure::rejected(detail);
            warn!(
                capability = %self.descriptor.name,
                operation = %self.operation,
                %failure,
                "Operation refused before scoping"
            );
            let answer = describe_failure(&self.descriptor, &failure);
            let outcome =
                HandlerOutcome::answered(&self.descriptor.name, answer, vec![ToolResult::Failure(failure)]);
            return Scoped::Reject(self.transition(Done { outcome }));
        }

        let violation = self
            .descriptor
            .first_violation(&self.operation, &self.arguments)
            .map(|rule| rule.prompt.clone());

        match violation {
            Some(prompt) => {
                debug!(
                    capability = %self.descriptor.name,
                    operation = %self.operation,
                    "Scoping rule fired, asking for clarification"
                );
                Scoped::Clarify(self.transition(Clarifying { prompt }))
            }
            None => Scoped::Execute(self.transition(Executing {
                evidence: Vec::new(),
                calls: 0,
            })),
        }
    }
}

impl<S: RunState> HandlerRun<S> {
    fn transition<T: RunState>(self, state: T) -> HandlerRun<T> {
        HandlerRun {
            descriptor: self.descriptor,
            operation: self.operation,
            arguments: self.arguments,
            credential: self.credential,
            state,
        }
    }
}

impl HandlerRun<Clarifying> {
    /// Clarification prompt
    pub fn prompt(&self) -> &str {
        &self.state.prompt
    }

    /// Finish without invoking any tool
    pub fn finish(self) -> HandlerRun<Done> {
        let outcome = HandlerOutcome::clarify(&self.descriptor.name, &self.state.prompt, Vec::new());
        self.transition(Done { outcome })
    }
}

impl HandlerRun<Executing> {
    /// Calls left in this turn's budget
    pub fn remaining_calls(&self) -> u32 {
        self.descriptor.max_calls.saturating_sub(self.state.calls)
    }

    /// Build a call to the capability server, or refuse it.
    ///
    /// Refusals are local: the allowlist, the discovered tool set and the call
    /// budget are checked here.
    pub fn prepare(&self, operation: &str, arguments: Map<String, Value>) -> Result<ToolCall, ToolFailure> {
        self.check(operation)?;
        Ok(ToolCall::new(&self.descriptor.tool_endpoint, operation)
            .with_arguments(arguments)
            .with_credential(self.credential.clone())
            .with_format(self.descriptor.payload_format)
            .with_timeout(self.descriptor.call_timeout))
    }

    fn check(&self, operation: &str) -> Result<(), ToolFailure> {
        self.descriptor.permits(operation).map_err(ToolFailure::rejected)?;
        if self.remaining_calls() == 0 {
            return Err(ToolFailure::rejected(format!(
                "call budget of {} exhausted for '{}'",
                self.descriptor.max_calls, self.descriptor.name
            )));
        }
        Ok(())
    }

    /// Invoke an operation of the capability server
    pub async fn invoke(
        &mut self,
        invoker: &dyn ToolInvoker,
        operation: &str,
        arguments: Map<String, Value>,
    ) -> ToolResult {
        match self.prepare(operation, arguments) {
            Ok(call) => self.submit(invoker, call).await,
            Err(failure) => {
                warn!(capability = %self.descriptor.name, operation, %failure, "Tool call refused");
                let result = ToolResult::Failure(failure);
                self.state.evidence.push(result.clone());
                result
            }
        }
    }

    /// Send a call built elsewhere (e.g. by the graph proxy).
    ///
    /// The call is re-checked and its credential replaced by this run's.
    pub async fn submit(&mut self, invoker: &dyn ToolInvoker, mut call: ToolCall) -> ToolResult {
        let result = match self.check(&call.operation) {
            Ok(()) => {
                call.credential = self.credential.clone();
                self.state.calls += 1;
                invoker.invoke(&call).await
            }
            Err(failure) => {
                warn!(capability = %self.descriptor.name, operation = %call.operation, %failure, "Tool call refused");
                ToolResult::Failure(failure)
            }
        };

        self.state.evidence.push(result.clone());
        result
    }

    /// Evidence recorded so far
    pub fn evidence(&self) -> &[ToolResult] {
        &self.state.evidence
    }

    /// Finish with an answer
    pub fn answer(self, answer: impl Into<String>) -> HandlerRun<Done> {
        let outcome = HandlerOutcome::answered(&self.descriptor.name, answer, self.state.evidence.clone());
        self.transition(Done { outcome })
    }

    /// Finish with a clarification discovered while executing
    pub fn clarify(self, prompt: impl Into<String>) -> HandlerRun<Done> {
        let outcome = HandlerOutcome::clarify(&self.descriptor.name, prompt, self.state.evidence.clone());
        self.transition(Done { outcome })
    }

    /// Finish with the user-facing explanation of a failure
    pub fn fail(self, failure: &ToolFailure) -> HandlerRun<Done> {
        if failure.kind == FailureKind::Transport {
            debug!(capability = %self.descriptor.name, %failure, "Capability server unreachable");
        }
        let answer = describe_failure(&self.descriptor, failure);
        self.answer(answer)
    }
}

impl HandlerRun<Done> {
    /// Consume into the outcome
    pub fn into_outcome(self) -> HandlerOutcome {
        self.state.outcome
    }
}
