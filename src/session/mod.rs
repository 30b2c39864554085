//! Whiteboard session: optimistic local edits reconciled with the backend
//! and with peers.
//!
//! DESIGN
//! ======
//! `Session::open` resolves the project's whiteboard (or falls back to an
//! offline-only one) and spawns the engine task. All interaction goes
//! through a cloneable [`SessionHandle`]; the engine is the only writer of
//! board state.
//!
//! Rendering reads the latest [`Snapshot`] from a `watch` channel. User-facing
//! problems arrive as [`Notice`]s on a separate channel so a UI can toast
//! them without polling.
//!
//! LIFECYCLE
//! =========
//! 1. Probe health; online ⇒ fetch the whiteboard, creating it if absent
//! 2. Any failure ⇒ `offline_{millis}` whiteboard, no backend writes
//! 3. Loaded objects are deduplicated, then the engine starts
//! 4. `shutdown()` or dropping every handle stops the engine

mod engine;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{Whiteboard, WhiteboardApi};
use crate::config::SyncConfig;
use crate::connectivity::{Attempt, ConnectivityMode, ConnectivityTracker};
use crate::error::{ObjectError, SessionError};
use crate::gesture::{DrawStyle, Tool};
use crate::merge::MergeStrategy;
use crate::object::{DrawableObject, ObjectPatch, Point};
use crate::presence::Collaborator;
use crate::transport::{InboundEvent, Transport};

use engine::{Command, Engine, EngineParts};

/// Capacity of the command channel between handles and the engine.
const COMMAND_CAPACITY: usize = 256;

// =============================================================================
// TYPES
// =============================================================================

/// The user this client acts for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalUser {
    pub user_id: String,
    pub user_name: String,
}

impl LocalUser {
    #[must_use]
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), user_name: user_name.into() }
    }
}

/// Everything a renderer needs, as of the last engine step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub whiteboard_id: String,
    pub offline_only: bool,
    /// Objects in draw order.
    pub objects: Vec<DrawableObject>,
    /// Shape being drawn, not yet in `objects`.
    pub draft: Option<DrawableObject>,
    pub collaborators: Vec<Collaborator>,
    pub mode: ConnectivityMode,
    /// IDs with unsettled backend writes, sorted.
    pub pending: Vec<String>,
    /// Store revision; changes whenever `objects` does.
    pub revision: u64,
}

/// User-facing message raised by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A backend write the user should know about failed.
    Error { code: &'static str, message: String },
    /// The loaded whiteboard contained objects without IDs or repeated IDs.
    Repaired { recovered: usize, dropped: usize },
}

/// Backend and transport a session talks to.
pub struct SessionIo {
    pub api: Arc<dyn WhiteboardApi>,
    pub transport: Arc<dyn Transport>,
    /// Peer events; `None` runs without realtime updates.
    pub inbound: Option<mpsc::Receiver<InboundEvent>>,
}

// =============================================================================
// SESSION
// =============================================================================

/// A running session: its handle, its notices and the engine task.
pub struct Session {
    pub handle: SessionHandle,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    task: JoinHandle<()>,
}

impl Session {
    /// Resolve the project's whiteboard and start the engine.
    ///
    /// Never fails: an unreachable backend yields an offline-only whiteboard.
    pub async fn open(config: &SyncConfig, io: SessionIo, project_id: &str, user: LocalUser) -> Self {
        let tracker = Arc::new(ConnectivityTracker::default());
        let whiteboard = load_whiteboard(&tracker, io.api.as_ref(), project_id).await;
        info!(
            project_id,
            whiteboard_id = %whiteboard.id,
            objects = whiteboard.objects.len(),
            mode = ?tracker.mode(),
            "whiteboard loaded"
        );
        Self::start(config, io, whiteboard, user, tracker)
    }

    /// Start the engine on an already resolved whiteboard, using the
    /// configured merge policy.
    #[must_use]
    pub fn start(
        config: &SyncConfig,
        io: SessionIo,
        whiteboard: Whiteboard,
        user: LocalUser,
        tracker: Arc<ConnectivityTracker>,
    ) -> Self {
        Self::start_with(config, io, whiteboard, user, tracker, Box::new(config.merge_policy))
    }

    /// As [`Session::start`], with a custom merge strategy.
    #[must_use]
    pub fn start_with(
        config: &SyncConfig,
        io: SessionIo,
        whiteboard: Whiteboard,
        user: LocalUser,
        tracker: Arc<ConnectivityTracker>,
        merge: Box<dyn MergeStrategy>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let engine = Engine::new(
            EngineParts {
                whiteboard,
                user,
                min_shape_size: config.min_shape_size,
                cursor_interval: config.cursor_interval,
                api: io.api,
                transport: io.transport,
                tracker: Arc::clone(&tracker),
                ids: config.id_scheme.generator(),
                merge,
                snapshot_tx,
                notice_tx,
            },
            settle_tx,
        );
        let task = tokio::spawn(engine.run(command_rx, settle_rx, io.inbound, config.dedupe_interval));

        Self { handle: SessionHandle { commands: command_tx, snapshots: snapshot_rx, tracker }, notices, task }
    }

    /// Stop the engine and wait for it to exit.
    pub async fn close(self) {
        self.handle.shutdown().await;
        let _ = self.task.await;
    }
}

async fn load_whiteboard(tracker: &ConnectivityTracker, api: &dyn WhiteboardApi, project_id: &str) -> Whiteboard {
    if tracker.probe(api).await == ConnectivityMode::Offline {
        return Whiteboard::offline(project_id);
    }
    match tracker.attempt(|| api.fetch_whiteboard(project_id)).await {
        Attempt::Completed(Some(whiteboard)) => whiteboard,
        Attempt::Completed(None) => {
            info!(project_id, "project has no whiteboard, creating one");
            tracker
                .try_server_operation(|| api.create_whiteboard(project_id), Whiteboard::offline(project_id))
                .await
        }
        Attempt::Skipped | Attempt::Failed(_) => Whiteboard::offline(project_id),
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front door to a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    tracker: Arc<ConnectivityTracker>,
}

impl SessionHandle {
    /// Add `object` locally, broadcast it and persist it in the background.
    /// An empty ID is filled in first.
    ///
    /// Returns the object's ID, or `None` if that ID already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn create_object(&self, object: DrawableObject) -> Result<Option<String>, SessionError> {
        self.request(|reply| Command::Create { object, reply }).await
    }

    /// Merge `patch` into an object locally and propagate it.
    ///
    /// Returns `Ok(Ok(false))` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn update_object(
        &self,
        id: impl Into<String>,
        patch: ObjectPatch,
    ) -> Result<Result<bool, ObjectError>, SessionError> {
        let id = id.into();
        self.request(|reply| Command::Update { id, patch, reply }).await
    }

    /// Remove an object locally and propagate the delete.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn delete_object(&self, id: impl Into<String>) -> Result<bool, SessionError> {
        let id = id.into();
        self.request(|reply| Command::Delete { id, reply }).await
    }

    /// Remove every object. Does nothing unless `confirmed`. Returns how many
    /// objects were removed locally.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn clear_all(&self, confirmed: bool) -> Result<usize, SessionError> {
        self.request(|reply| Command::Clear { confirmed, reply }).await
    }

    /// Feed a peer event, as the transport would.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn ingest(&self, event: InboundEvent) -> Result<(), SessionError> {
        self.send(Command::Ingest(event)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn pointer_down(&self, tool: Tool, at: Point) -> Result<(), SessionError> {
        self.send(Command::PointerDown { tool, at }).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn pointer_move(&self, at: Point) -> Result<(), SessionError> {
        self.send(Command::PointerMove(at)).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn pointer_up(&self) -> Result<(), SessionError> {
        self.send(Command::PointerUp).await
    }

    /// Drop the in-progress draft or drag without persisting it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn cancel_gesture(&self) -> Result<(), SessionError> {
        self.send(Command::CancelGesture).await
    }

    /// Style for objects drawn from now on.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn set_style(&self, style: DrawStyle) -> Result<(), SessionError> {
        self.send(Command::SetStyle(style)).await
    }

    /// Probe the backend again; a healthy answer re-enables backend writes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn reconnect(&self) -> Result<ConnectivityMode, SessionError> {
        self.request(Command::Reconnect).await
    }

    /// Resolves once no backend call is outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn settled(&self) -> Result<(), SessionError> {
        self.request(Command::WaitSettled).await
    }

    /// Current state, after every command sent before this call.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the engine has stopped.
    pub async fn snapshot(&self) -> Result<Snapshot, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// Receiver of published snapshots, for rendering.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Receiver of the connectivity mode, for the offline indicator.
    #[must_use]
    pub fn connectivity(&self) -> watch::Receiver<ConnectivityMode> {
        self.tracker.subscribe()
    }

    /// Ask the engine to stop. Outstanding backend calls still run to
    /// completion, but their results are discarded.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.commands.send(cmd).await.map_err(|_| SessionError::Closed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
