//! Graph proxy against a fake metrics server over HTTP

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_sdk::prelude::*;
use switchboard::tools::{GraphEnvelope, GraphProxy, GraphRequest};

#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<Value>>>,
    authorization: Arc<Mutex<Option<String>>>,
}

async fn reply_with(
    State((recorded, reply)): State<(Recorded, Value)>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Json<Value> {
    *recorded.authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let id = request["id"].clone();
    recorded.requests.lock().unwrap().push(request);

    let mut envelope = reply;
    envelope["jsonrpc"] = json!("2.0");
    envelope["id"] = id;
    Json(envelope)
}

async fn metrics_server(reply: Value) -> (String, Recorded) {
    let recorded = Recorded::default();
    let router = Router::new()
        .route("/mcp", post(reply_with))
        .with_state((recorded.clone(), reply));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}/mcp", addr), recorded)
}

fn proxy(endpoint: &str) -> GraphProxy {
    let client = McpToolClient::new(HttpTransport::new(HttpTransportConfig::default()).unwrap());
    GraphProxy::new(Arc::new(client), endpoint, Duration::from_secs(5))
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({"result": {"content": [{"type": "text", "text": text}], "isError": is_error}})
}

#[tokio::test]
async fn test_graph_returns_chart_envelope() {
    let (endpoint, recorded) = metrics_server(text_result("{\"resultType\":\"matrix\",\"result\":[]}", false)).await;

    let request = GraphRequest {
        query: "rate(http_requests_total{job=\"api\"}[5m])".to_string(),
        description: "API request rate".to_string(),
        start: None,
        end: None,
        step: Some("5m".to_string()),
    };
    let envelope = proxy(&endpoint)
        .graph(&request, Some(Credential::bearer("sha256~user")))
        .await;

    assert_eq!(
        envelope,
        GraphEnvelope::Data {
            query: "rate(http_requests_total{job=\"api\"}[5m])".to_string(),
            description: "API request rate".to_string(),
            data: json!({"resultType": "matrix", "result": []}),
        }
    );
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "query": "rate(http_requests_total{job=\"api\"}[5m])",
            "description": "API request rate",
            "data": {"resultType": "matrix", "result": []}
        })
    );

    let requests = recorded.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let params = &requests[0]["params"];
    assert_eq!(params["name"], "execute_range_query");
    assert_eq!(params["arguments"]["start"], "NOW-1h");
    assert_eq!(params["arguments"]["end"], "NOW");
    assert_eq!(params["arguments"]["step"], "5m");
    assert_eq!(
        recorded.authorization.lock().unwrap().as_deref(),
        Some("Bearer sha256~user")
    );
}

#[tokio::test]
async fn test_graph_remote_error_envelope() {
    let (endpoint, _) = metrics_server(text_result("bad_data: parse error at char 5", true)).await;

    let request = GraphRequest::new("up{", "Broken query");
    let envelope = proxy(&endpoint).graph(&request, None).await;

    assert!(envelope.is_error());
    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(body["query"], "up{");
    assert_eq!(body["description"], "Broken query");
    assert!(body["error"].as_str().unwrap().contains("parse error"));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_graph_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/mcp", listener.local_addr().unwrap());
    drop(listener);

    let envelope = proxy(&endpoint).graph(&GraphRequest::new("up", "Targets up"), None).await;

    match envelope {
        GraphEnvelope::Error { error, query, .. } => {
            assert!(error.starts_with("transport"), "{}", error);
            assert_eq!(query, "up");
        }
        other => panic!("expected an error envelope, got {:?}", other),
    }
}
