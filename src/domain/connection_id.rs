//! Opaque connection identity.
//!
//! [`ConnectionId`] is minted by the [`super::ConnectionRegistry`] when a
//! transport session opens and is never reused, so it cannot collide with
//! transport-internal resource ids.

use std::fmt;

use serde::Serialize;

/// Process-unique identifier of a live relay connection.
///
/// Wraps a UUID v4. Only the registry creates these; once the connection
/// is removed the id is dead and every registry lookup with it is a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Mints a fresh random id.
    #[must_use]
    pub(crate) fn mint() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let full = self.0.simple().to_string();
        write!(f, "conn-{}", full.get(..8).unwrap_or(full.as_str()))
    }
}
