//! Connectivity tracker: is the backend reachable right now?
//!
//! DESIGN
//! ======
//! A single mode flag behind a `watch` channel, shared (`Arc`) between the
//! session task and the backend calls it spawns. Any failed call flips the
//! mode to offline; any successful call flips it back. While offline, calls
//! are skipped without being started.
//!
//! There is no background reconnect poll. The mode only changes on the next
//! explicit attempt made while online, on `probe`, or on `mark_online`.

use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::WhiteboardApi;
use crate::error::{ApiError, ErrorCode};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectivityMode {
    #[default]
    Online,
    Offline,
}

/// Outcome of a gated backend call.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The call ran and succeeded.
    Completed(T),
    /// The tracker was offline; the call was never started.
    Skipped,
    /// The call ran and failed; the tracker is now offline.
    Failed(ApiError),
}

impl<T> Attempt<T> {
    /// Collapse to the value, or `fallback` if skipped or failed.
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            Self::Completed(v) => v,
            Self::Skipped | Self::Failed(_) => fallback,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            Self::Skipped | Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug)]
pub struct ConnectivityTracker {
    mode: watch::Sender<ConnectivityMode>,
}

impl ConnectivityTracker {
    #[must_use]
    pub fn new(initial: ConnectivityMode) -> Self {
        let (mode, _) = watch::channel(initial);
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> ConnectivityMode {
        *self.mode.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.mode() == ConnectivityMode::Online
    }

    /// Receiver for the persistent offline indicator.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityMode> {
        self.mode.subscribe()
    }

    pub fn mark_online(&self) {
        if self.set(ConnectivityMode::Online) {
            info!("backend reachable, switching to online mode");
        }
    }

    pub fn mark_offline(&self) {
        if self.set(ConnectivityMode::Offline) {
            warn!("backend unreachable, switching to offline mode");
        }
    }

    /// One reachability check against the health endpoint. Returns the new mode.
    pub async fn probe(&self, api: &dyn WhiteboardApi) -> ConnectivityMode {
        match api.health().await {
            Ok(()) => self.mark_online(),
            Err(e) => {
                debug!(error = %e, code = e.error_code(), "health probe failed");
                self.mark_offline();
            }
        }
        self.mode()
    }

    /// Run `op` unless offline, updating the mode from its outcome.
    pub async fn attempt<T, F, Fut>(&self, op: F) -> Attempt<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !self.is_online() {
            debug!("offline, skipping backend call");
            return Attempt::Skipped;
        }
        match op().await {
            Ok(v) => {
                self.mark_online();
                Attempt::Completed(v)
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), retryable = e.retryable(), "backend call failed");
                self.mark_offline();
                Attempt::Failed(e)
            }
        }
    }

    /// Run `op` unless offline; return `fallback` if skipped or failed.
    /// Never errors.
    pub async fn try_server_operation<T, F, Fut>(&self, op: F, fallback: T) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.attempt(op).await.unwrap_or(fallback)
    }

    fn set(&self, next: ConnectivityMode) -> bool {
        self.mode.send_if_modified(|mode| {
            if *mode == next {
                return false;
            }
            *mode = next;
            true
        })
    }
}

impl Default for ConnectivityTracker {
    fn default() -> Self {
        Self::new(ConnectivityMode::Online)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "connectivity_test.rs"]
mod tests;
