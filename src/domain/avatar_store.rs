//! Authoritative map of published avatars.
//!
//! [`AvatarStore`] has no locking of its own: it lives inside the
//! [`super::ConnectionRegistry`] and is only touched under the registry's
//! lock.

use std::collections::BTreeMap;

use super::Avatar;

/// Mapping of avatar guid to its last published state.
///
/// A `BTreeMap` keeps snapshot payloads in a stable key order.
pub type AvatarMap = BTreeMap<String, Avatar>;

/// Last-write-wins store keyed by the guid a source publishes under.
#[derive(Debug, Default)]
pub struct AvatarStore {
    avatars: AvatarMap,
}

impl AvatarStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the avatar for `guid`.
    pub fn put(&mut self, guid: impl Into<String>, avatar: Avatar) {
        self.avatars.insert(guid.into(), avatar);
    }

    /// Returns the avatar for `guid`, if one has been published.
    #[must_use]
    pub fn get(&self, guid: &str) -> Option<&Avatar> {
        self.avatars.get(guid)
    }

    /// Removes and returns the avatar for `guid`.
    pub fn remove(&mut self, guid: &str) -> Option<Avatar> {
        self.avatars.remove(guid)
    }

    /// Copies the full current state.
    #[must_use]
    pub fn snapshot(&self) -> AvatarMap {
        self.avatars.clone()
    }

    /// Number of published avatars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    /// Returns `true` if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }
}
