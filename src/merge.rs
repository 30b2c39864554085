//! Merge policy: who wins when local and remote copies disagree.
//!
//! DESIGN
//! ======
//! Three conflict points exist in the session:
//! - a peer announces an object whose ID is already in the local store,
//! - a peer updates an object this client still has writes in flight for,
//! - the backend acknowledges a create with a copy that differs locally.
//!
//! `MergeStrategy` decides each one. `MergePolicy` covers the built-in
//! choices; a session accepts any boxed strategy.

use crate::object::{DrawableObject, ObjectPatch};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
}

pub trait MergeStrategy: Send + std::fmt::Debug {
    /// A peer added an object whose ID already exists locally.
    fn resolve_remote_add(&self, local: &DrawableObject, remote: &DrawableObject) -> Resolution;

    /// Whether a peer's update should be merged. `locally_pending` is true
    /// while this client has unsettled writes for the same object.
    fn accept_remote_update(&self, local: &DrawableObject, patch: &ObjectPatch, locally_pending: bool) -> bool;

    /// The backend acknowledged a create and returned its copy.
    fn resolve_server_ack(&self, local: &DrawableObject, server: &DrawableObject) -> Resolution;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Local copies survive add conflicts and acknowledgements; peer updates
    /// apply in arrival order.
    #[default]
    Optimistic,
    /// As `Optimistic`, but peer updates to objects with local writes in
    /// flight are ignored.
    LocalWins,
    /// Peer adds and backend acknowledgements replace local copies.
    RemoteWins,
}

impl MergePolicy {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "optimistic" => Some(Self::Optimistic),
            "local_wins" => Some(Self::LocalWins),
            "remote_wins" => Some(Self::RemoteWins),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
        }
    }
}

impl MergeStrategy for MergePolicy {
    fn resolve_remote_add(&self, local: &DrawableObject, remote: &DrawableObject) -> Resolution {
        match self {
            Self::RemoteWins if local != remote => Resolution::TakeRemote,
            _ => Resolution::KeepLocal,
        }
    }

    fn accept_remote_update(&self, _local: &DrawableObject, _patch: &ObjectPatch, locally_pending: bool) -> bool {
        !(matches!(self, Self::LocalWins) && locally_pending)
    }

    fn resolve_server_ack(&self, local: &DrawableObject, server: &DrawableObject) -> Resolution {
        match self {
            Self::RemoteWins if local != server && local.id == server.id => Resolution::TakeRemote,
            _ => Resolution::KeepLocal,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
