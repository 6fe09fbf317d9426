//! HTTP transport for MCP capability servers
//!
//! Implements the client half of MCP streamable HTTP: every call is a single
//! `POST` of a JSON-RPC envelope. The server may answer with a plain JSON body
//! or with a short `text/event-stream` whose first reply event carries the
//! response.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};

use super::{ClientTransport, RequestOptions};
use crate::error::TransportError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum accepted response body (8 MiB)
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Bytes of an error body kept for diagnostics
const ERROR_BODY_PREVIEW: usize = 512;

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Timeout applied when a request does not specify its own
    pub default_timeout: Duration,

    /// Maximum accepted response size
    pub max_response_bytes: usize,

    /// Connection pool size per host
    pub pool_max_idle_per_host: usize,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            pool_max_idle_per_host: 8,
            user_agent: format!("mcp-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `reqwest`-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.default_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        options: &RequestOptions,
    ) -> Result<JsonRpcResponse, TransportError> {
        debug!(endpoint, method = %request.method, "Sending JSON-RPC request");

        let mut builder = self
            .client
            .post(endpoint)
            .timeout(options.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .json(request);

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, options.timeout))?;

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("text/event-stream"))
            .unwrap_or(false);

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > self.config.max_response_bytes {
                return Err(TransportError::TooLarge {
                    actual: length,
                    limit: self.config.max_response_bytes,
                });
            }
        }

        // Chunked and event-stream bodies carry no length; count as they arrive
        let limit = self.config.max_response_bytes;
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::from_reqwest(e, options.timeout))?
        {
            let received = body.len() + chunk.len();
            if received > limit {
                return Err(TransportError::TooLarge { actual: received, limit });
            }
            body.extend_from_slice(&chunk);
        }

        if !status.is_success() {
            let preview = String::from_utf8_lossy(&body);
            let preview: String = preview.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        trace!(endpoint, bytes = body.len(), event_stream = is_event_stream, "Received response body");

        if is_event_stream {
            let text = std::str::from_utf8(&body)
                .map_err(|e| TransportError::Decode(format!("event stream is not UTF-8: {}", e)))?;
            decode_event_stream(text)
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| TransportError::Decode(format!("invalid JSON-RPC body: {}", e)))
        }
    }
}

/// Pull the first JSON-RPC reply out of a `text/event-stream` body.
///
/// Events are separated by blank lines; multi-line `data:` fields are joined
/// with `\n`. Notifications and unparsable events are skipped.
pub fn decode_event_stream(body: &str) -> Result<JsonRpcResponse, TransportError> {
    let mut data = String::new();

    for line in body.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            if !data.is_empty() {
                if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&data) {
                    if response.is_reply() {
                        return Ok(response);
                    }
                }
                data.clear();
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    Err(TransportError::Decode(
        "event stream carried no JSON-RPC response".to_string(),
    ))
}
