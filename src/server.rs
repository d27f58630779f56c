//! HTTP server assembly.
//!
//! [`build_app`] wires the REST surface and the WebSocket upgrade routes
//! into one Axum router; [`serve`] binds it to the configured address.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::RelayConfig;
use crate::service::MessageRouter;
use crate::ws::handler::ws_handler;

/// Default WebSocket route, always served.
pub const WS_ROUTE: &str = "/ws";

/// Builds shared state for a fresh relay from `config`.
#[must_use]
pub fn build_state(config: &RelayConfig) -> AppState {
    AppState {
        router: Arc::new(MessageRouter::new(config.routing_policy())),
        outbound_queue_capacity: config.outbound_queue_capacity,
    }
}

/// Builds the full Axum application.
///
/// The WebSocket upgrade is served at [`WS_ROUTE`] and at `ws_path`.
pub fn build_app(state: AppState, ws_path: &str) -> Router {
    let mut app = Router::new()
        .merge(api::build_router())
        .route(WS_ROUTE, get(ws_handler));
    if ws_path != WS_ROUTE {
        app = app.route(ws_path, get(ws_handler));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves the relay until the process
/// exits.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &RelayConfig) -> anyhow::Result<()> {
    let app = build_app(build_state(config), &config.ws_path);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        addr = %config.listen_addr,
        ws_path = %config.ws_path,
        "server listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
