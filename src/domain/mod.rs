//! Domain layer: connection identity, roles, avatars, and the registry.
//!
//! This module contains the relay's shared state: the opaque connection
//! id minted on connect, the role each connection holds, the avatar store,
//! the per-connection outbound queue, and the registry tying them together.

pub mod avatar;
pub mod avatar_store;
pub mod connection_id;
pub mod connection_registry;
pub mod outbound;
pub mod role;

pub use avatar::Avatar;
pub use avatar_store::{AvatarMap, AvatarStore};
pub use connection_id::ConnectionId;
pub use connection_registry::{ConnectionRegistry, RegistryCounts, RemovedInfo};
pub use outbound::{Outbound, Payload};
pub use role::Role;
