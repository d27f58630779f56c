//! Relay state endpoints: avatar snapshot and connection statistics.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{AvatarsResponse, StatsResponse};
use crate::app_state::AppState;
use crate::domain::Avatar;
use crate::error::{ErrorResponse, RelayError};

/// `GET /avatars` — Current avatar snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/avatars",
    tag = "Relay",
    summary = "Current avatars",
    description = "Returns every avatar currently published by a live source, keyed by guid.",
    responses(
        (status = 200, description = "Avatar snapshot", body = AvatarsResponse),
    )
)]
pub async fn list_avatars(State(state): State<AppState>) -> impl IntoResponse {
    let avatars = state.router.snapshot().await;
    (
        StatusCode::OK,
        Json(AvatarsResponse {
            count: avatars.len(),
            avatars,
        }),
    )
}

/// `GET /avatars/{guid}` — Last published value of one avatar.
///
/// # Errors
///
/// Returns [`RelayError::AvatarNotFound`] if nothing is published under `guid`.
#[utoipa::path(
    get,
    path = "/api/v1/avatars/{guid}",
    tag = "Relay",
    summary = "Get one avatar",
    description = "Returns the last value published under a guid by a live source.",
    params(
        ("guid" = String, Path, description = "Avatar guid"),
    ),
    responses(
        (status = 200, description = "Avatar", body = Avatar),
        (status = 404, description = "Avatar not found", body = ErrorResponse),
    )
)]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> Result<Json<Avatar>, RelayError> {
    let avatar = state
        .router
        .avatar(&guid)
        .await
        .ok_or(RelayError::AvatarNotFound(guid))?;
    Ok(Json(avatar))
}

/// `GET /stats` — Connection counts per role.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Relay",
    summary = "Relay statistics",
    description = "Returns live connection counts per role, the number of published avatars, and dropped outbound messages.",
    responses(
        (status = 200, description = "Relay statistics", body = StatsResponse),
    )
)]
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.router.counts().await;
    let dropped_messages = state.router.dropped_total().await;
    (
        StatusCode::OK,
        Json(StatsResponse {
            connections,
            dropped_messages,
        }),
    )
}

/// Relay state routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/avatars", get(list_avatars))
        .route("/avatars/{guid}", get(get_avatar))
        .route("/stats", get(stats))
}
