//! Switchboard - query router for read-only cluster capability servers
//!
//! Switchboard answers operational questions about a running cluster by
//! dispatching them to capability servers reached over MCP: cluster
//! resources, Prometheus/Thanos metrics, detected incidents and product
//! documentation.
//!
//! # Architecture
//!
//! - `capabilities` - Capability descriptors, scoping rules and the registry
//! - `agents` - One handler per capability, with the handler lifecycle
//! - `intelligence` - Classification contract and the LLM classifier
//! - `orchestration` - Per-turn dispatch, join and response composition
//! - `session` - Per-conversation state
//! - `tools` - The time-series graph proxy
//! - `server` - HTTP interface
//! - `runtime` - Process wiring

#![warn(clippy::all)]

pub mod agents;
pub mod capabilities;
pub mod config;
pub mod intelligence;
pub mod orchestration;
pub mod runtime;
pub mod server;
pub mod session;
pub mod tools;

pub use capabilities::{CapabilityDescriptor, CapabilityRegistry};
pub use config::SwitchboardConfig;
pub use orchestration::{ComposedResponse, Orchestrator, Query};
pub use runtime::Runtime;

/// Switchboard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
