//! Connection registry: live connections, their roles, and the avatar store.
//!
//! [`ConnectionRegistry`] is plain data with no interior locking. The
//! [`crate::service::MessageRouter`] keeps it behind a single mutex so that
//! role transitions, avatar upserts/removals and consumer-list reads are
//! all serialized together.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use utoipa::ToSchema;

use super::avatar_store::AvatarMap;
use super::{Avatar, AvatarStore, ConnectionId, Outbound, Role};
use crate::error::RelayError;

/// Registry bookkeeping for one live connection.
#[derive(Debug)]
struct ConnectionEntry {
    role: Role,
    outbound: Outbound,
    /// Guids this connection has written to the store.
    published: BTreeSet<String>,
}

/// What [`ConnectionRegistry::remove`] tore down.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedInfo {
    /// Role the connection held when it was removed.
    pub role: Role,
    /// Avatars deleted from the store together with the connection, with
    /// their last published values. Empty unless `role` was a source that
    /// had published at least once.
    pub avatars: AvatarMap,
}

/// Per-role connection counts plus store size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RegistryCounts {
    /// Connections that have not registered yet.
    pub unclassified: usize,
    /// Registered avatar sources.
    pub sources: usize,
    /// Registered avatar consumers.
    pub consumers: usize,
    /// Avatars currently published.
    pub avatars: usize,
}

/// Tracks every live connection and its role, and owns the [`AvatarStore`].
///
/// # Invariants
///
/// - Each live connection holds exactly one [`Role`].
/// - Promotion out of `Unclassified` happens at most once.
/// - Every avatar in the store is bound to, or was written by, a
///   still-registered source. Removing a source removes its bound guid and
///   the foreign guids it wrote that no other live source is bound to.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    store: AvatarStore,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly opened connection as unclassified and mints its id.
    pub fn add_unclassified(&mut self, outbound: Outbound) -> ConnectionId {
        let conn = ConnectionId::mint();
        self.connections.insert(
            conn,
            ConnectionEntry {
                role: Role::Unclassified,
                outbound,
                published: BTreeSet::new(),
            },
        );
        conn
    }

    /// Promotes an unclassified connection to an avatar source bound to `guid`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ConnectionNotFound`] if `conn` is not live.
    /// - [`RelayError::InvalidRoleTransition`] if `conn` is already a source
    ///   or consumer.
    pub fn promote_to_source(
        &mut self,
        conn: ConnectionId,
        guid: impl Into<String>,
    ) -> Result<(), RelayError> {
        let entry = self.unclassified_entry(conn)?;
        entry.role = Role::Source { guid: guid.into() };
        Ok(())
    }

    /// Promotes an unclassified connection to an avatar consumer.
    ///
    /// # Errors
    ///
    /// - [`RelayError::ConnectionNotFound`] if `conn` is not live.
    /// - [`RelayError::InvalidRoleTransition`] if `conn` is already a source
    ///   or consumer.
    pub fn promote_to_consumer(&mut self, conn: ConnectionId) -> Result<(), RelayError> {
        let entry = self.unclassified_entry(conn)?;
        entry.role = Role::Consumer;
        Ok(())
    }

    fn unclassified_entry(
        &mut self,
        conn: ConnectionId,
    ) -> Result<&mut ConnectionEntry, RelayError> {
        let entry = self
            .connections
            .get_mut(&conn)
            .ok_or(RelayError::ConnectionNotFound(conn))?;
        if entry.role != Role::Unclassified {
            return Err(RelayError::InvalidRoleTransition {
                conn,
                role: entry.role.label(),
            });
        }
        Ok(entry)
    }

    /// Writes `avatar` under `guid` on behalf of source `conn`.
    ///
    /// With `strict_guid` set, a source may only publish under the guid it
    /// registered with.
    ///
    /// # Errors
    ///
    /// - [`RelayError::UnauthorizedUpdate`] if `conn` is not a live source.
    /// - [`RelayError::GuidMismatch`] if `strict_guid` is set and `guid`
    ///   differs from the registered one.
    pub fn publish(
        &mut self,
        conn: ConnectionId,
        guid: &str,
        avatar: Avatar,
        strict_guid: bool,
    ) -> Result<(), RelayError> {
        let Some(entry) = self.connections.get_mut(&conn) else {
            return Err(RelayError::UnauthorizedUpdate(conn));
        };
        let Role::Source { guid: bound } = &entry.role else {
            return Err(RelayError::UnauthorizedUpdate(conn));
        };
        if strict_guid && bound != guid {
            return Err(RelayError::GuidMismatch {
                bound: bound.clone(),
                requested: guid.to_string(),
            });
        }
        entry.published.insert(guid.to_string());
        self.store.put(guid, avatar);
        Ok(())
    }

    /// Forgets `conn`, deleting any avatars it published.
    ///
    /// A source always takes its bound guid with it. Other guids it wrote
    /// are deleted too, except those bound to another live source, which
    /// stay with their owner.
    ///
    /// Returns `None` if `conn` was already removed, so duplicate close or
    /// error notifications are harmless.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<RemovedInfo> {
        let entry = self.connections.remove(&conn)?;
        let mut avatars = AvatarMap::new();
        if let Role::Source { guid } = &entry.role {
            let owned_elsewhere: BTreeSet<&str> = self
                .connections
                .values()
                .filter_map(|other| match &other.role {
                    Role::Source { guid: bound } => Some(bound.as_str()),
                    _ => None,
                })
                .collect();
            for published in entry.published.iter().chain(std::iter::once(guid)) {
                if published != guid && owned_elsewhere.contains(published.as_str()) {
                    continue;
                }
                if let Some(avatar) = self.store.remove(published) {
                    avatars.insert(published.clone(), avatar);
                }
            }
        }
        Some(RemovedInfo {
            role: entry.role,
            avatars,
        })
    }

    /// Role currently held by `conn`, or `None` if it is not live.
    #[must_use]
    pub fn role(&self, conn: ConnectionId) -> Option<&Role> {
        self.connections.get(&conn).map(|entry| &entry.role)
    }

    /// Guid a source connection registered with.
    #[must_use]
    pub fn bound_guid(&self, conn: ConnectionId) -> Option<&str> {
        match self.role(conn) {
            Some(Role::Source { guid }) => Some(guid.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if `conn` is a live source.
    #[must_use]
    pub fn is_source(&self, conn: ConnectionId) -> bool {
        matches!(self.role(conn), Some(Role::Source { .. }))
    }

    /// Returns `true` if `conn` is a live consumer.
    #[must_use]
    pub fn is_consumer(&self, conn: ConnectionId) -> bool {
        matches!(self.role(conn), Some(Role::Consumer))
    }

    /// Ids of all live consumers.
    #[must_use]
    pub fn list_consumers(&self) -> Vec<ConnectionId> {
        self.ids_where(|role| matches!(role, Role::Consumer))
    }

    /// Ids of all live sources.
    #[must_use]
    pub fn list_sources(&self) -> Vec<ConnectionId> {
        self.ids_where(|role| matches!(role, Role::Source { .. }))
    }

    fn ids_where(&self, pred: impl Fn(&Role) -> bool) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, entry)| pred(&entry.role))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Outbound handles of all live consumers, for fan-out under the
    /// registry lock.
    #[must_use]
    pub fn consumer_outbounds(&self) -> Vec<Outbound> {
        self.connections
            .values()
            .filter(|entry| entry.role == Role::Consumer)
            .map(|entry| entry.outbound.clone())
            .collect()
    }

    /// Outbound handle of `conn`.
    #[must_use]
    pub fn outbound(&self, conn: ConnectionId) -> Option<Outbound> {
        self.connections.get(&conn).map(|entry| entry.outbound.clone())
    }

    /// Read-only view of the avatar store.
    #[must_use]
    pub fn store(&self) -> &AvatarStore {
        &self.store
    }

    /// Per-role connection counts.
    #[must_use]
    pub fn counts(&self) -> RegistryCounts {
        let mut counts = RegistryCounts {
            avatars: self.store.len(),
            ..RegistryCounts::default()
        };
        for entry in self.connections.values() {
            match entry.role {
                Role::Unclassified => counts.unclassified += 1,
                Role::Source { .. } => counts.sources += 1,
                Role::Consumer => counts.consumers += 1,
            }
        }
        counts
    }

    /// Sum of outbound payloads dropped across live connections.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.connections
            .values()
            .map(|entry| entry.outbound.dropped())
            .sum()
    }
}
