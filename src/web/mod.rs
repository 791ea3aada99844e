//! HTTP front end.
//!
//! Provides:
//! - Chat completion proxy (`POST /api/chat`)
//! - Health check (`GET /health`)
//! - Static chat page from the configured directory (everything else)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::client::ChatClient;

mod handlers;

pub use handlers::{ChatPayload, ChatReply, ErrorBody};

pub struct AppState {
    pub client: ChatClient,
}

pub fn create_router(state: Arc<AppState>, static_dir: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/health", get(handlers::health_check))
        .fallback_service(ServeDir::new(static_dir.into()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(client: ChatClient, addr: SocketAddr, static_dir: PathBuf) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind web front end to {addr}"))?;
    info!(
        addr = %addr,
        static_dir = %static_dir.display(),
        model = %client.model(),
        "web front end listening"
    );

    let router = create_router(Arc::new(AppState { client }), static_dir);
    axum::serve(listener, router)
        .await
        .context("Web server terminated unexpectedly")
}
