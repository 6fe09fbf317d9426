//! HTTP interface
//!
//! - `GET /` status
//! - `GET /health` model and capability servers
//! - `POST /turn` one conversation turn
//! - `POST /graph` chart-ready range query

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::config::ServerConfig;
use crate::runtime::Runtime;

pub mod error;
pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use routes::{create_routes, AppState};

/// Sessions are swept this often
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// CORS layer allowing the configured origins
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

/// Routes with tracing and CORS
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    create_routes(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&config.cors_origins))
}

/// Serve until Ctrl-C
pub async fn start_server(runtime: Runtime) -> Result<()> {
    let Runtime {
        config,
        orchestrator,
        graph,
        ..
    } = runtime;

    let shutdown = CancellationToken::new();
    let sweeper = orchestrator
        .sessions()
        .clone()
        .spawn_sweeper(SWEEP_INTERVAL, shutdown.clone());

    let state = AppState {
        orchestrator,
        graph,
        model: config.classifier.model.clone(),
    };
    let app = router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local: SocketAddr = listener.local_addr()?;

    info!("Switchboard API Server starting...");
    info!("  Listening: http://{}", local);
    info!("  Model:     {}", config.classifier.model);
    info!("  CORS:      {}", config.server.cors_origins.join(", "));

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
                shutdown.cancel();
            }
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}
