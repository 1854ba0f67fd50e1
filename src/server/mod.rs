//! Control-plane server: WebSocket session endpoints plus the liveness
//! probe.

pub mod session;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::config::CommandRegistry;

pub struct AppState {
    pub registry: CommandRegistry,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/exec", get(session::ws_handler))
        .route("/echo", get(session::ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Liveness probe, independent of session state.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn serve(addr: &str, registry: CommandRegistry) -> crate::Result<()> {
    let state = Arc::new(AppState { registry });
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening for control connections");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
