//! # MCP Client SDK
//!
//! Client-side plumbing for calling tools on MCP (Model Context Protocol)
//! capability servers over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = McpToolClient::new(HttpTransport::new(HttpTransportConfig::default())?);
//!
//!     let call = ToolCall::new("http://localhost:8002/mcp", "list_metrics");
//!     match client.invoke(&call).await {
//!         ToolResult::Success(payload) => println!("{payload}"),
//!         ToolResult::Failure(failure) => eprintln!("{failure}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON-RPC envelopes and `tools/*` payloads
//! - [`transport`]: Transport abstraction and the HTTP implementation
//! - [`client`]: Tool invocation with three-tier failure classification
//! - [`error`]: Transport errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

/// Commonly used types
pub mod prelude {
    pub use crate::client::{
        Credential, FailureKind, McpToolClient, PayloadFormat, ToolCall, ToolFailure, ToolInvoker,
        ToolResult,
    };
    pub use crate::error::TransportError;
    pub use crate::protocol::{
        CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolContent, ToolDefinition,
    };
    pub use crate::transport::{ClientTransport, HttpTransport, HttpTransportConfig, RequestOptions};
}

/// SDK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
