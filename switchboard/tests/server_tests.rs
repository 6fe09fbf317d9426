//! HTTP API tests against the assembled runtime

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use switchboard::config::SwitchboardConfig;
use switchboard::intelligence::{DispatchDecision, Selection};
use switchboard::runtime::Runtime;
use switchboard::server::{router, AppState};

async fn app_with(config: SwitchboardConfig, invoker: Arc<MockInvoker>, decision: DispatchDecision) -> Router {
    let classifier = Arc::new(ScriptedClassifier::always(decision));
    let runtime = Runtime::assemble(config, invoker, classifier).await.unwrap();
    let state = AppState {
        orchestrator: runtime.orchestrator.clone(),
        graph: runtime.graph.clone(),
        model: runtime.config.classifier.model.clone(),
    };
    router(state, &runtime.config.server)
}

async fn app(invoker: Arc<MockInvoker>, decision: DispatchDecision) -> Router {
    app_with(SwitchboardConfig::default(), invoker, decision).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_status() {
    let app = app(Arc::new(MockInvoker::new()), DispatchDecision::direct("hi")).await;

    let (status, body) = send(app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["agent"], "switchboard");
    assert_eq!(body["version"], switchboard::VERSION);
}

#[tokio::test]
async fn test_health_lists_discovered_capabilities() {
    let app = app(Arc::new(MockInvoker::new()), DispatchDecision::direct("hi")).await;

    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let capabilities = body["capabilities"].as_array().unwrap();
    let names: Vec<&str> = capabilities.iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["kubernetes", "metrics", "incidents", "docs"]);

    let kubernetes = &capabilities[0];
    assert_eq!(kubernetes["domain"], "Cluster resources");
    assert!(kubernetes["tool_set_version"].is_u64());
    let operations: Vec<&str> = kubernetes["operations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_str().unwrap())
        .collect();
    assert!(operations.contains(&"pods_list_in_namespace"));
    assert!(!operations.contains(&"pods_delete"));
}

#[tokio::test]
async fn test_turn_direct_answer() {
    let invoker = Arc::new(MockInvoker::new());
    let app = app(invoker.clone(), DispatchDecision::direct("Hello! Ask me about your cluster.")).await;

    let (status, body) = send(app, post("/turn", json!({"text": "hello"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Hello! Ask me about your cluster.");
    assert_eq!(body["needs_clarification"], false);
    assert!(!body["conversation_id"].as_str().unwrap().is_empty());
    assert_eq!(invoker.call_count(), 0);
}

#[tokio::test]
async fn test_turn_forwards_bearer_header() {
    let invoker = Arc::new(MockInvoker::new().reply("get_incidents", json!([])));
    let app = app(
        invoker.clone(),
        DispatchDecision::parallel(vec![Selection::new("incidents")]),
    )
    .await;

    let request = Request::builder()
        .method("POST")
        .uri("/turn")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer sha256~user")
        .body(Body::from(json!({"text": "any incidents?", "conversation_id": "conv-1"}).to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversation_id"], "conv-1");
    assert_eq!(body["text"], "No incidents detected; the cluster looks healthy.");

    let call = call_of(&invoker, "get_incidents").unwrap();
    let credential = call.credential.unwrap();
    assert_eq!(credential.header, "kubernetes-authorization");
    assert_eq!(credential.token(), "sha256~user");
}

#[tokio::test]
async fn test_turn_clarification_flag() {
    let app = app(
        Arc::new(MockInvoker::new()),
        DispatchDecision::parallel(vec![Selection::new("kubernetes").with_operation("pods_list")]),
    )
    .await;

    let (status, body) = send(app, post("/turn", json!({"text": "show me all pods"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needs_clarification"], true);
    assert_eq!(body["text"], "Which namespace? Or a specific pod name?");
}

#[tokio::test]
async fn test_turn_rejects_empty_text() {
    let app = app(Arc::new(MockInvoker::new()), DispatchDecision::direct("hi")).await;

    let (status, body) = send(app, post("/turn", json!({"text": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
}

#[tokio::test]
async fn test_graph_endpoint() {
    let invoker = Arc::new(
        MockInvoker::new().reply("execute_range_query", json!({"resultType": "matrix", "result": []})),
    );
    let app = app(invoker.clone(), DispatchDecision::direct("hi")).await;

    let request = Request::builder()
        .method("POST")
        .uri("/graph")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer sha256~user")
        .body(Body::from(
            json!({"query": "up{job=\"api\"}", "description": "API targets"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "query": "up{job=\"api\"}",
            "description": "API targets",
            "data": {"resultType": "matrix", "result": []}
        })
    );

    let call = call_of(&invoker, "execute_range_query").unwrap();
    assert_eq!(call.str_arg("start"), Some("NOW-1h"));
    assert_eq!(call.credential.unwrap().token(), "sha256~user");
}

#[tokio::test]
async fn test_graph_rejects_empty_query() {
    let app = app(Arc::new(MockInvoker::new()), DispatchDecision::direct("hi")).await;

    let (status, _) = send(app, post("/graph", json!({"query": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_graph_without_metrics_capability() {
    let mut config = SwitchboardConfig::default();
    config.capabilities.metrics.enabled = false;
    let app = app_with(config, Arc::new(MockInvoker::new()), DispatchDecision::direct("hi")).await;

    let (status, body) = send(app, post("/graph", json!({"query": "up"}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_startup_fails_when_nothing_is_reachable() {
    let classifier = Arc::new(ScriptedClassifier::always(DispatchDecision::direct("hi")));
    let result = Runtime::assemble(SwitchboardConfig::default(), Arc::new(MockInvoker::unreachable()), classifier).await;

    let error = result.err().expect("startup should fail");
    assert!(error.to_string().contains("No capability server is reachable"));
}
