//! Data Transfer Objects for REST responses.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AvatarMap, RegistryCounts};

/// Current avatar snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvatarsResponse {
    /// Number of published avatars.
    pub count: usize,
    /// Avatars keyed by guid, in the same shape as a `sendAvatars` payload.
    pub avatars: AvatarMap,
}

/// Relay connection statistics.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Per-role connection counts and store size.
    pub connections: RegistryCounts,
    /// Outbound payloads dropped for stalled live connections.
    pub dropped_messages: u64,
}
