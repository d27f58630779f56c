//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] covers every way a request can be refused. Protocol
//! errors never reach the transport: the router logs them and either
//! answers with a failed `register` ack or drops the request. The REST
//! surface renders them through [`IntoResponse`] as an [`ErrorResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "malformed payload: missing field `method`",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Relay error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status               |
/// |-----------|---------------------|---------------------------|
/// | 1000–1999 | Payload validation  | 400 Bad Request           |
/// | 2000–2999 | Role / connection   | 404 Not Found / 409 / 403 |
/// | 3000–3999 | Server              | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Payload could not be decoded or lacks required fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// `register` carried a `type` other than a known client kind.
    #[error("unknown client type: {0}")]
    UnknownClientType(String),

    /// Registration attempted on a connection that already has a role.
    #[error("{conn} is already registered as {role}")]
    InvalidRoleTransition {
        /// Connection that attempted to re-register.
        conn: ConnectionId,
        /// Role it currently holds.
        role: &'static str,
    },

    /// `updateAvatar` from a connection that is not a registered source.
    #[error("{0} is not a registered avatar source")]
    UnauthorizedUpdate(ConnectionId),

    /// `updateAvatar` without a display name.
    #[error("update for {0} has no avatar name")]
    IncompleteUpdate(String),

    /// Strict mode: a source tried to publish under another guid.
    #[error("source bound to {bound} attempted to publish {requested}")]
    GuidMismatch {
        /// Guid the source registered with.
        bound: String,
        /// Guid carried by the update.
        requested: String,
    },

    /// No avatar is published under the requested guid.
    #[error("avatar not found: {0}")]
    AvatarNotFound(String),

    /// Connection id is not (or no longer) live.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedPayload(_) => 1001,
            Self::UnknownClientType(_) => 1002,
            Self::IncompleteUpdate(_) => 1003,
            Self::InvalidRoleTransition { .. } => 2001,
            Self::UnauthorizedUpdate(_) => 2002,
            Self::GuidMismatch { .. } => 2003,
            Self::ConnectionNotFound(_) => 2004,
            Self::AvatarNotFound(_) => 2005,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPayload(_) | Self::UnknownClientType(_) | Self::IncompleteUpdate(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidRoleTransition { .. } => StatusCode::CONFLICT,
            Self::UnauthorizedUpdate(_) | Self::GuidMismatch { .. } => StatusCode::FORBIDDEN,
            Self::ConnectionNotFound(_) | Self::AvatarNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
