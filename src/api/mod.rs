//! REST API layer: read-only relay state, health, and OpenAPI docs.
//!
//! Relay endpoints are mounted under `/api/v1`; system endpoints at the
//! root. The relay protocol itself is WebSocket-only (see [`crate::ws`]).

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "avatar-relay", description = "Read-only view of the avatar relay"),
    paths(
        handlers::system::health_handler,
        handlers::relay::list_avatars,
        handlers::relay::get_avatar,
        handlers::relay::stats,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Relay", description = "Live relay state"),
    )
)]
pub struct ApiDoc;

/// Path the OpenAPI JSON document is served at.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs_router())
}

#[cfg(feature = "swagger-ui")]
fn docs_router() -> Router<AppState> {
    Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_router() -> Router<AppState> {
    Router::new().route(
        OPENAPI_PATH,
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
