//! WebSocket message types: inbound requests and outbound payloads.
//!
//! Every frame is a bare JSON object. Inbound requests are discriminated by
//! their `method` field; outbound payloads use the exact field names the
//! avatar clients expect (`requestedMethod`, `sendAvatars`, `mapId`, ...).

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Avatar, AvatarMap, Payload};
use crate::error::RelayError;

/// Request sent by a client, one variant per recognized `method`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method")]
pub enum Request {
    /// Classify the connection as a source or a consumer.
    #[serde(rename = "register")]
    Register(RegisterRequest),
    /// Publish the sender's current avatar state.
    #[serde(rename = "updateAvatar")]
    UpdateAvatar(UpdateAvatarRequest),
    /// Any other method. Ignored.
    #[serde(other)]
    Unknown,
}

impl Request {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedPayload`] if the text is not a JSON
    /// object, has no `method`, or a recognized method is missing one of
    /// its required fields.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// What a `register` request asks the connection to become.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKind {
    /// `"AvatarSource"`.
    AvatarSource,
    /// `"AvatarConsumer"`.
    AvatarConsumer,
    /// Anything else, including a missing or non-string `type`. Holds the
    /// raw value for logging (empty when absent).
    Unrecognized(String),
}

impl Default for ClientKind {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

fn client_kind<'de, D>(deserializer: D) -> Result<ClientKind, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if s == "AvatarSource" => ClientKind::AvatarSource,
        serde_json::Value::String(s) if s == "AvatarConsumer" => ClientKind::AvatarConsumer,
        serde_json::Value::String(s) => ClientKind::Unrecognized(s),
        serde_json::Value::Null => ClientKind::default(),
        other => ClientKind::Unrecognized(other.to_string()),
    })
}

/// Body of a `register` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterRequest {
    /// Requested client kind.
    #[serde(rename = "type", default, deserialize_with = "client_kind")]
    pub kind: ClientKind,
    /// Guid the source will publish under. Required for sources.
    #[serde(default)]
    pub guid: Option<String>,
}

/// Body of an `updateAvatar` request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvatarRequest {
    /// Guid to publish under.
    pub guid: String,
    /// Display name. Empty or absent while the player has no character
    /// loaded, in which case the update is ignored.
    #[serde(default)]
    pub name: Option<String>,
    /// Position on the x axis.
    pub x: f64,
    /// Position on the y axis.
    pub y: f64,
    /// Position on the z axis.
    pub z: f64,
    /// Map id.
    pub map_id: u32,
    /// World id.
    pub world_id: u32,
}

impl UpdateAvatarRequest {
    /// Splits the request into its guid and the avatar to store.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::IncompleteUpdate`] if the name is empty or
    /// missing.
    pub fn into_avatar(self) -> Result<(String, Avatar), RelayError> {
        let name = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(RelayError::IncompleteUpdate(self.guid)),
        };
        let avatar = Avatar {
            name,
            x: self.x,
            y: self.y,
            z: self.z,
            map_id: self.map_id,
            world_id: self.world_id,
        };
        Ok((self.guid, avatar))
    }
}

/// Reply to a `register` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    /// Always `"register"`.
    pub requested_method: String,
    /// Whether the connection was classified.
    pub result: bool,
}

impl RegisterAck {
    /// Builds the ack for a `register` request.
    #[must_use]
    pub fn register(result: bool) -> Self {
        Self {
            requested_method: "register".to_string(),
            result,
        }
    }
}

/// Kind of avatar broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastMethod {
    /// Avatars were published (full snapshot or single-avatar delta).
    #[serde(rename = "sendAvatars")]
    SendAvatars,
    /// Avatars went away with their source.
    #[serde(rename = "removeAvatars")]
    RemoveAvatars,
}

/// Avatar broadcast pushed to every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarBroadcast {
    /// Broadcast kind.
    pub method: BroadcastMethod,
    /// Affected avatars keyed by guid.
    pub avatars: AvatarMap,
}

impl AvatarBroadcast {
    /// `sendAvatars` carrying the given avatars.
    #[must_use]
    pub fn send(avatars: AvatarMap) -> Self {
        Self {
            method: BroadcastMethod::SendAvatars,
            avatars,
        }
    }

    /// `sendAvatars` carrying a single avatar.
    #[must_use]
    pub fn delta(guid: impl Into<String>, avatar: Avatar) -> Self {
        Self::send(AvatarMap::from([(guid.into(), avatar)]))
    }

    /// `removeAvatars` carrying the last known values.
    #[must_use]
    pub fn remove(avatars: AvatarMap) -> Self {
        Self {
            method: BroadcastMethod::RemoveAvatars,
            avatars,
        }
    }
}

/// Serializes an outbound message once so it can be shared by every
/// recipient.
///
/// # Errors
///
/// Returns [`RelayError::Internal`] if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<Payload, RelayError> {
    serde_json::to_string(message)
        .map(Arc::from)
        .map_err(|e| RelayError::Internal(e.to_string()))
}
