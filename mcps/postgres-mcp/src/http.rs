//! HTTP server: MCP endpoint, REST API, and health check on one router

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde_json::{json, Value};
use sql_guard::Gatekeeper;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::config::ServerConfig;
use crate::rest;
use crate::server::PostgresMcpServer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(gatekeeper: Gatekeeper, server: ServerConfig) -> Self {
        Self {
            gatekeeper,
            server: Arc::new(server),
        }
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gatekeeper = state.gatekeeper.clone();
    let name = state.server.name.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(PostgresMcpServer::new(gatekeeper.clone(), name.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let protected = Router::new()
        .route("/api/connections", get(rest::list_connections))
        .route("/api/query", post(rest::query))
        .route("/api/schema", post(rest::schema))
        .nest_service(&state.server.path, mcp_service)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/healthz", get(health))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthz (unauthenticated)
async fn health(State(state): State<AppState>) -> Json<Value> {
    let names = state.gatekeeper.registry().names();
    Json(json!({
        "ok": true,
        "time": chrono::Utc::now().to_rfc3339(),
        "server": state.server.name,
        "connections": names.len(),
        "connection_names": names,
    }))
}

/// Serve HTTP until ctrl-c
pub async fn serve(state: AppState) -> Result<()> {
    if !state.server.auth_enabled() {
        tracing::warn!("MCP_TOKEN is not set - the gateway accepts unauthenticated requests");
    }

    let host = state.server.host.clone();
    let port = state.server.port;
    let mcp_path = state.server.path.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        "Listening on http://{} (MCP at {}, REST at /api, health at /healthz)",
        addr,
        mcp_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
