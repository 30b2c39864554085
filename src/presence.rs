//! Presence: who else is on the board and where their cursor is.
//!
//! DESIGN
//! ======
//! Cursor positions are ephemeral: one entry per peer user, replaced by each
//! newer event and removed only when the transport reports the user left.
//! A peer whose connection dies silently stays listed until the server
//! notices. Nothing here is persisted.
//!
//! Outbound cursor moves are throttled by `CursorThrottle` so a fast pointer
//! does not flood the socket.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cursor colors handed out to users, picked by hashing the user ID.
const CURSOR_PALETTE: [&str; 8] =
    ["#E53935", "#8E24AA", "#3949AB", "#039BE5", "#00897B", "#7CB342", "#FDD835", "#FB8C00"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub user_name: String,
    pub cursor: Cursor,
}

/// Stable cursor color for a user.
#[must_use]
pub fn cursor_color(user_id: &str) -> &'static str {
    let hash = user_id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    CURSOR_PALETTE[hash as usize % CURSOR_PALETTE.len()]
}

#[derive(Debug)]
pub struct PresenceTracker {
    local_user_id: String,
    collaborators: HashMap<String, Collaborator>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self { local_user_id: local_user_id.into(), collaborators: HashMap::new() }
    }

    /// Insert or replace the entry for `collaborator.user_id`.
    ///
    /// Returns `false` (and changes nothing) for the local user's own echo.
    pub fn upsert(&mut self, collaborator: Collaborator) -> bool {
        if collaborator.user_id == self.local_user_id {
            return false;
        }
        self.collaborators
            .insert(collaborator.user_id.clone(), collaborator);
        true
    }

    pub fn remove(&mut self, user_id: &str) -> Option<Collaborator> {
        let removed = self.collaborators.remove(user_id);
        if removed.is_some() {
            debug!(%user_id, "collaborator left");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&Collaborator> {
        self.collaborators.get(user_id)
    }

    /// Collaborators ordered by display name, then user ID.
    #[must_use]
    pub fn list(&self) -> Vec<Collaborator> {
        let mut list: Vec<Collaborator> = self.collaborators.values().cloned().collect();
        list.sort_by(|a, b| {
            a.user_name
                .cmp(&b.user_name)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }
}

/// Rate gate for outbound cursor broadcasts.
#[derive(Debug)]
pub struct CursorThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl CursorThrottle {
    /// A zero `interval` lets every move through.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_sent: None }
    }

    /// Returns `true` and records `now` if a broadcast is due.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_sent
            && now.saturating_duration_since(last) < self.interval
        {
            return false;
        }
        self.last_sent = Some(now);
        true
    }

    /// Forget the last send so the next move always goes out.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
