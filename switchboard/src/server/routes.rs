//! API routes

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::error::ApiError;
use crate::orchestration::{Orchestrator, Query};
use crate::tools::{GraphEnvelope, GraphProxy, GraphRequest};
use mcp_sdk::client::Credential;

/// Name reported by the status endpoints
pub const AGENT_NAME: &str = "switchboard";

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub graph: Option<GraphProxy>,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub status: String,
    pub agent: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CapabilityHealth {
    pub name: String,
    pub domain: String,
    pub endpoint: String,
    /// Tool set version, absent when discovery did not reach the server
    pub tool_set_version: Option<u64>,
    pub operations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agent: String,
    pub model: String,
    pub capabilities: Vec<CapabilityHealth>,
    pub sessions: usize,
}

/// Inbound turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    /// A new conversation is started when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub text: String,
    pub needs_clarification: bool,
}

/// Create all API routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/turn", post(turn))
        .route("/graph", post(graph))
        .with_state(state)
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        agent: AGENT_NAME.to_string(),
        version: crate::VERSION.to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let capabilities = state
        .orchestrator
        .registry()
        .descriptors()
        .map(|d| CapabilityHealth {
            name: d.name.clone(),
            domain: d.domain.title().to_string(),
            endpoint: d.tool_endpoint.clone(),
            tool_set_version: d.tool_set.as_ref().map(|t| t.version),
            operations: match &d.tool_set {
                Some(tool_set) => tool_set.operations.iter().cloned().collect(),
                None => d.operations.iter().cloned().collect(),
            },
        })
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        agent: AGENT_NAME.to_string(),
        model: state.model.clone(),
        capabilities,
        sessions: state.orchestrator.sessions().len(),
    })
}

/// Token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let token = request.auth_token.or_else(|| bearer_token(&headers));
    let query = Query::new(request.text, conversation_id.clone()).with_token(token);

    // Dropping this future (client gone) cancels the turn
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = state.orchestrator.handle_turn(query, cancel).await?;
    debug!(%conversation_id, clarification = response.needs_clarification, "Turn answered");

    Ok(Json(TurnResponse {
        conversation_id,
        text: response.text,
        needs_clarification: response.needs_clarification,
    }))
}

async fn graph(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GraphRequest>,
) -> Result<Json<GraphEnvelope>, ApiError> {
    let Some(proxy) = state.graph.as_ref() else {
        return Err(ApiError::NotFound("the metrics capability is not enabled".to_string()));
    };
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let credential = bearer_token(&headers).map(Credential::bearer);
    Ok(Json(proxy.graph(&request, credential).await))
}
