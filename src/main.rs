//! chatflow - conversational flow interpreter
//!
//! Serves published chatbot flows: each inbound message advances a persisted
//! session through the flow graph until the next point that needs the user.

mod api;
mod condition;
mod config;
mod db;
mod engine;
mod flow;
mod runtime;
mod script;
mod variables;

use api::{create_router, AppState};
use config::{EngineConfig, ServerConfig};
use db::Database;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatflow=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let server = ServerConfig::from_env();
    let engine = EngineConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&server.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %server.db_path, "Opening database");
    let db = Database::open(&server.db_path)?;

    tracing::info!(
        max_hops = engine.max_hops,
        script_failure = ?engine.script_failure,
        script_timeout_ms = u64::try_from(engine.script_limits.timeout.as_millis()).unwrap_or(u64::MAX),
        script_max_steps = engine.script_limits.max_steps,
        "Engine configured"
    );
    let state = AppState::new(db, engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], server.port));
    tracing::info!("chatflow server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
