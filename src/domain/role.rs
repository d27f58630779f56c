//! Connection roles.

use std::fmt;

/// Classification of a connection. Exactly one holds at any time.
///
/// Promotion out of [`Role::Unclassified`] happens at most once; neither
/// `Source` nor `Consumer` transitions anywhere except removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Connected but not yet registered.
    Unclassified,
    /// Publishes avatar updates, bound to the guid it registered with.
    Source {
        /// Guid supplied in the `register` request.
        guid: String,
    },
    /// Receives avatar broadcasts.
    Consumer,
}

impl Role {
    /// Short lowercase label used in logs and errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::Source { .. } => "source",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
