//! mcp-chatbot HTTP Server
//!
//! Axum-based server exposing the chat loop over a WebSocket, plus a
//! health check and the tool listing.

mod handlers;
mod protocol;
mod state;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatbot_runtime::{
    DEFAULT_CONFIG_PATH, LlmSettings, ServerConfigFile, build_orchestrator, connect_all,
};

use crate::handlers::{chat_ws_handler, health_check, list_tools};
use crate::state::AppState;

/// Build the application router
fn router(state: AppState, static_dir: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/tools", get(list_tools))
        .route("/ws", get(chat_ws_handler))
        // Static files (web client)
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let settings = LlmSettings::from_env()?;
    let config_path =
        std::env::var("MCP_SERVER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let servers = ServerConfigFile::load(&config_path)?;

    let registry = connect_all(&servers).await;
    tracing::info!("Registered {} tools:", registry.len());
    for name in registry.names() {
        tracing::info!("  • {} ({})", name, registry.provider_of(name).unwrap_or("?"));
    }

    let orchestrator = Arc::new(build_orchestrator(&settings, Arc::new(registry))?);
    let state = AppState::new(orchestrator);

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "web".into());
    let app = router(state, &static_dir);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("mcp-chatbot server running on http://{}", addr);
    tracing::info!("  Provider: {} ({})", settings.provider, settings.model);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health     - Health check");
    tracing::info!("  GET  /api/tools  - List available tools");
    tracing::info!("  GET  /ws         - WebSocket chat");

    axum::serve(listener, app).await?;

    Ok(())
}
