//! Published avatar state.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Last-known state of one avatar, as published by its source.
///
/// Serialized field names are part of the wire contract:
/// `name`, `x`, `y`, `z`, `mapId`, `worldId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    /// Display name of the character.
    pub name: String,
    /// Position on the x axis.
    pub x: f64,
    /// Position on the y axis.
    pub y: f64,
    /// Position on the z axis.
    pub z: f64,
    /// Map the avatar is currently on.
    pub map_id: u32,
    /// World (shard) the avatar is playing on.
    pub world_id: u32,
}
