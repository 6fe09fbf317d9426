//! MCP protocol types used on the client side.
//!
//! - [`request`]: JSON-RPC 2.0 request envelope and the `tools/*` constructors
//! - [`response`]: JSON-RPC 2.0 response envelope and error object
//! - [`types`]: `tools/call` and `tools/list` payloads

pub mod request;
pub mod response;
pub mod types;

pub use request::*;
pub use response::*;
pub use types::*;

/// JSON-RPC protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for invoking a tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Method name for enumerating tools.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
