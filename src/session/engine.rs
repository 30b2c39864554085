//! Session engine: the single task that owns all mutable board state.
//!
//! DESIGN
//! ======
//! The engine receives three kinds of input in one `select!` loop:
//! - commands from `SessionHandle`s,
//! - settlements reported by the backend calls it spawned,
//! - peer events from the transport,
//!
//! plus a ticker that drives the self-healing deduplication sweep.
//!
//! Local edits are applied to the store first, broadcast second and
//! persisted last, in a spawned task gated by the connectivity tracker. A
//! settlement only clears the pending mark (and, for creates, flushes the
//! update or delete held back behind the create). Nothing is ever rolled back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::{LocalUser, Notice, Snapshot};
use crate::api::{Whiteboard, WhiteboardApi};
use crate::connectivity::{Attempt, ConnectivityMode, ConnectivityTracker};
use crate::error::{ErrorCode, ObjectError};
use crate::gesture::{DrawStyle, GestureEvent, GestureState, Tool, tool_kind};
use crate::ident::IdGenerator;
use crate::merge::{MergeStrategy, Resolution};
use crate::object::{DrawableObject, ObjectPatch, Point};
use crate::presence::{Collaborator, Cursor, CursorThrottle, PresenceTracker, cursor_color};
use crate::store::ObjectStore;
use crate::transport::{
    CursorMove, InboundEvent, ObjectAdded, ObjectDeleted, ObjectUpdated, OutboundEvent, Transport, UpdateAction,
    WhiteboardUpdate,
};

// =============================================================================
// COMMANDS
// =============================================================================

pub(crate) enum Command {
    Create { object: DrawableObject, reply: oneshot::Sender<Option<String>> },
    Update { id: String, patch: ObjectPatch, reply: oneshot::Sender<Result<bool, ObjectError>> },
    Delete { id: String, reply: oneshot::Sender<bool> },
    Clear { confirmed: bool, reply: oneshot::Sender<usize> },
    Ingest(InboundEvent),
    PointerDown { tool: Tool, at: Point },
    PointerMove(Point),
    PointerUp,
    CancelGesture,
    SetStyle(DrawStyle),
    Reconnect(oneshot::Sender<ConnectivityMode>),
    Snapshot(oneshot::Sender<Snapshot>),
    WaitSettled(oneshot::Sender<()>),
    Shutdown,
}

/// Result of a spawned backend call, reported back to the engine.
pub(crate) enum Settlement {
    Created { id: String, outcome: Attempt<DrawableObject> },
    Updated { id: String, outcome: Attempt<()> },
    Deleted { id: String, outcome: Attempt<()> },
    Cleared { outcome: Attempt<()> },
    Probed,
}

// =============================================================================
// ENGINE
// =============================================================================

pub(crate) struct Engine {
    whiteboard_id: String,
    offline_only: bool,
    user: LocalUser,
    local_color: &'static str,

    store: ObjectStore,
    presence: PresenceTracker,
    gesture: GestureState,
    style: DrawStyle,
    throttle: CursorThrottle,
    last_pointer: Option<Point>,
    min_shape_size: f64,

    /// Unsettled backend writes per object ID.
    pending: HashMap<String, usize>,
    /// Objects whose create has not settled yet.
    creating: HashSet<String>,
    /// Updates held back until the object's create settles.
    queued: HashMap<String, ObjectPatch>,
    /// Deletes held back until the object's create settles.
    deferred_deletes: HashSet<String>,
    /// Spawned backend calls not yet settled, including clears.
    in_flight: usize,
    waiters: Vec<oneshot::Sender<()>>,

    api: Arc<dyn WhiteboardApi>,
    transport: Arc<dyn Transport>,
    tracker: Arc<ConnectivityTracker>,
    ids: Box<dyn IdGenerator>,
    merge: Box<dyn MergeStrategy>,

    settle_tx: mpsc::UnboundedSender<Settlement>,
    snapshot_tx: watch::Sender<Snapshot>,
    notice_tx: mpsc::UnboundedSender<Notice>,
}

pub(crate) struct EngineParts {
    pub whiteboard: Whiteboard,
    pub user: LocalUser,
    pub min_shape_size: f64,
    pub cursor_interval: Duration,
    pub api: Arc<dyn WhiteboardApi>,
    pub transport: Arc<dyn Transport>,
    pub tracker: Arc<ConnectivityTracker>,
    pub ids: Box<dyn IdGenerator>,
    pub merge: Box<dyn MergeStrategy>,
    pub snapshot_tx: watch::Sender<Snapshot>,
    pub notice_tx: mpsc::UnboundedSender<Notice>,
}

impl Engine {
    /// Build the engine from a loaded whiteboard, repairing its objects.
    pub(crate) fn new(parts: EngineParts, settle_tx: mpsc::UnboundedSender<Settlement>) -> Self {
        let offline_only = parts.whiteboard.is_offline_only();
        let (store, report) = ObjectStore::from_objects(parts.whiteboard.objects, parts.ids.as_ref());
        if !report.is_clean() {
            warn!(
                whiteboard_id = %parts.whiteboard.id,
                recovered = report.recovered.len(),
                dropped = report.dropped,
                "repaired whiteboard on load"
            );
            let _ = parts
                .notice_tx
                .send(Notice::Repaired { recovered: report.recovered.len(), dropped: report.dropped });
        }

        Self {
            whiteboard_id: parts.whiteboard.id,
            offline_only,
            local_color: cursor_color(&parts.user.user_id),
            presence: PresenceTracker::new(parts.user.user_id.clone()),
            user: parts.user,
            store,
            gesture: GestureState::new(),
            style: DrawStyle::default(),
            throttle: CursorThrottle::new(parts.cursor_interval),
            last_pointer: None,
            min_shape_size: parts.min_shape_size,
            pending: HashMap::new(),
            creating: HashSet::new(),
            queued: HashMap::new(),
            deferred_deletes: HashSet::new(),
            in_flight: 0,
            waiters: Vec::new(),
            api: parts.api,
            transport: parts.transport,
            tracker: parts.tracker,
            ids: parts.ids,
            merge: parts.merge,
            settle_tx,
            snapshot_tx: parts.snapshot_tx,
            notice_tx: parts.notice_tx,
        }
    }

    /// Drive the engine until shutdown or until every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut settlements: mpsc::UnboundedReceiver<Settlement>,
        mut inbound: Option<mpsc::Receiver<InboundEvent>>,
        dedupe_interval: Duration,
    ) {
        info!(whiteboard_id = %self.whiteboard_id, offline_only = self.offline_only, "session started");
        self.publish();

        let mut ticker = interval_at(tokio::time::Instant::now() + dedupe_interval, dedupe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_cmd = commands.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    if matches!(cmd, Command::Shutdown) {
                        break;
                    }
                    self.handle_command(cmd);
                }
                Some(settlement) = settlements.recv() => {
                    self.settle(settlement);
                }
                maybe_event = recv_inbound(&mut inbound) => {
                    match maybe_event {
                        Some(event) => self.ingest(event),
                        None => {
                            info!("realtime transport ended, continuing without peers");
                            inbound = None;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
            self.publish();
            self.wake_waiters();
        }

        info!(whiteboard_id = %self.whiteboard_id, pending = self.in_flight, "session stopped");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Create { object, reply } => {
                let id = self.create(object);
                self.publish();
                let _ = reply.send(id);
            }
            Command::Update { id, patch, reply } => {
                let result = self.update(&id, patch);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Delete { id, reply } => {
                let removed = self.delete(&id);
                self.publish();
                let _ = reply.send(removed);
            }
            Command::Clear { confirmed, reply } => {
                let removed = self.clear_all(confirmed);
                self.publish();
                let _ = reply.send(removed);
            }
            Command::Ingest(event) => self.ingest(event),
            Command::PointerDown { tool, at } => self.pointer_down(tool, at),
            Command::PointerMove(at) => self.pointer_move(at),
            Command::PointerUp => self.pointer_up(),
            Command::CancelGesture => {
                self.gesture.cancel(&mut self.store);
                self.throttle.reset();
            }
            Command::SetStyle(style) => self.style = style,
            Command::Reconnect(reply) => self.reconnect(reply),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::WaitSettled(reply) => self.waiters.push(reply),
            Command::Shutdown => {}
        }
    }

    // =========================================================================
    // LOCAL EDITS
    // =========================================================================

    fn create(&mut self, mut object: DrawableObject) -> Option<String> {
        if !object.has_id() {
            object.id = self.ids.generate(object.kind().as_str(), Some(self.user.user_id.as_str()));
        }
        let id = object.id.clone();
        if !self.store.add(object.clone()) {
            return None;
        }
        debug!(%id, kind = %object.kind(), "object created locally");
        self.emit(UpdateAction::Add { object: object.clone() });

        if self.offline_only {
            return Some(id);
        }
        self.mark_pending(&id);
        self.creating.insert(id.clone());

        let api = Arc::clone(&self.api);
        let tracker = Arc::clone(&self.tracker);
        let wb = self.whiteboard_id.clone();
        let settled_id = id.clone();
        self.spawn_call(async move {
            let outcome = tracker.attempt(|| api.add_object(&wb, &object)).await;
            Settlement::Created { id: settled_id, outcome }
        });
        Some(id)
    }

    fn update(&mut self, id: &str, patch: ObjectPatch) -> Result<bool, ObjectError> {
        if !self.store.update(id, &patch)? {
            debug!(%id, "update for unknown object ignored");
            return Ok(false);
        }
        self.emit(UpdateAction::Update { object_id: id.to_owned(), updates: patch.clone() });

        if self.offline_only {
            return Ok(true);
        }
        if self.creating.contains(id) {
            debug!(%id, "create still pending, queueing update");
            self.queued.entry(id.to_owned()).or_default().extend(patch);
            return Ok(true);
        }
        self.spawn_update(id.to_owned(), patch);
        Ok(true)
    }

    fn delete(&mut self, id: &str) -> bool {
        if self.store.remove(id).is_none() {
            debug!(%id, "delete for unknown object ignored");
            return false;
        }
        self.queued.remove(id);
        self.emit(UpdateAction::Delete { object_id: id.to_owned() });

        if self.offline_only {
            return true;
        }
        if self.creating.contains(id) {
            debug!(%id, "create still pending, deferring delete");
            self.deferred_deletes.insert(id.to_owned());
            return true;
        }
        self.spawn_delete(id.to_owned());
        true
    }

    fn clear_all(&mut self, confirmed: bool) -> usize {
        if !confirmed {
            debug!("clear not confirmed, ignoring");
            return 0;
        }
        let removed = self.wipe();
        info!(whiteboard_id = %self.whiteboard_id, removed, "whiteboard cleared locally");
        self.emit(UpdateAction::Clear);

        if !self.offline_only {
            let api = Arc::clone(&self.api);
            let tracker = Arc::clone(&self.tracker);
            let wb = self.whiteboard_id.clone();
            self.spawn_call(async move {
                let outcome = tracker.attempt(|| api.clear(&wb)).await;
                Settlement::Cleared { outcome }
            });
        }
        removed
    }

    fn spawn_update(&mut self, id: String, patch: ObjectPatch) {
        self.mark_pending(&id);
        let api = Arc::clone(&self.api);
        let tracker = Arc::clone(&self.tracker);
        let wb = self.whiteboard_id.clone();
        self.spawn_call(async move {
            let outcome = tracker.attempt(|| api.update_object(&wb, &id, &patch)).await;
            Settlement::Updated { id, outcome }
        });
    }

    fn spawn_delete(&mut self, id: String) {
        self.mark_pending(&id);
        let api = Arc::clone(&self.api);
        let tracker = Arc::clone(&self.tracker);
        let wb = self.whiteboard_id.clone();
        self.spawn_call(async move {
            let outcome = tracker.attempt(|| api.delete_object(&wb, &id)).await;
            Settlement::Deleted { id, outcome }
        });
    }

    /// Empty the store and forget every pending mark, queued update and
    /// deferred delete.
    fn wipe(&mut self) -> usize {
        self.pending.clear();
        self.creating.clear();
        self.queued.clear();
        self.deferred_deletes.clear();
        self.store.clear()
    }

    // =========================================================================
    // SETTLEMENTS
    // =========================================================================

    fn settle(&mut self, settlement: Settlement) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match settlement {
            Settlement::Created { id, outcome } => self.settle_create(&id, outcome),
            Settlement::Updated { id, outcome } => {
                self.unmark_pending(&id);
                if outcome.is_completed() {
                    debug!(%id, "update persisted");
                }
            }
            Settlement::Deleted { id, outcome } => {
                self.unmark_pending(&id);
                if let Attempt::Failed(e) = outcome {
                    self.notify_error(e.error_code(), format!("Failed to delete object: {e}"));
                }
            }
            Settlement::Cleared { outcome } => {
                if let Attempt::Failed(e) = outcome {
                    self.notify_error(e.error_code(), format!("Failed to clear whiteboard: {e}"));
                }
            }
            Settlement::Probed => {}
        }
    }

    fn settle_create(&mut self, id: &str, outcome: Attempt<DrawableObject>) {
        self.unmark_pending(id);
        self.creating.remove(id);
        let queued = self.queued.remove(id);
        let deleted = self.deferred_deletes.remove(id);

        let server = match outcome {
            Attempt::Completed(server) => server,
            Attempt::Skipped | Attempt::Failed(_) => {
                if queued.is_some() || deleted {
                    debug!(%id, deleted, "create not persisted, dropping held-back writes");
                }
                return;
            }
        };
        debug!(%id, "create persisted");

        if deleted {
            self.spawn_delete(id.to_owned());
            return;
        }

        if server.id == id
            && let Some(local) = self.store.get(id)
            && self.merge.resolve_server_ack(local, &server) == Resolution::TakeRemote
        {
            self.store.replace(server);
            if let Some(patch) = &queued
                && let Err(e) = self.store.update(id, patch)
            {
                warn!(%id, error = %e, code = e.error_code(), "queued update no longer fits acknowledged object");
            }
        }

        if let Some(patch) = queued
            && self.store.contains(id)
        {
            self.spawn_update(id.to_owned(), patch);
        }
    }

    // =========================================================================
    // PEER EVENTS
    // =========================================================================

    fn ingest(&mut self, event: InboundEvent) {
        if let Some(target) = event.whiteboard_id()
            && target != self.whiteboard_id
        {
            debug!(%target, "ignoring event for another whiteboard");
            return;
        }

        match event {
            InboundEvent::WhiteboardObjectAdded(ObjectAdded { object, .. }) => self.ingest_added(object),
            InboundEvent::WhiteboardObjectUpdated(ObjectUpdated { object_id, updates, .. }) => {
                self.ingest_updated(&object_id, &updates);
            }
            InboundEvent::WhiteboardObjectDeleted(ObjectDeleted { object_id, .. }) => {
                if self.store.remove(&object_id).is_some() {
                    self.queued.remove(&object_id);
                    debug!(id = %object_id, "object deleted by peer");
                }
            }
            InboundEvent::WhiteboardCleared(_) => {
                let removed = self.wipe();
                info!(whiteboard_id = %self.whiteboard_id, removed, "whiteboard cleared by peer");
            }
            InboundEvent::CursorUpdated(cursor) => {
                let color = cursor.color.unwrap_or_else(|| cursor_color(&cursor.user_id).to_owned());
                self.presence.upsert(Collaborator {
                    user_id: cursor.user_id,
                    user_name: cursor.user_name,
                    cursor: Cursor { x: cursor.x, y: cursor.y, color },
                });
            }
            InboundEvent::UserLeft(left) => {
                self.presence.remove(&left.user_id);
            }
        }
    }

    fn ingest_added(&mut self, mut remote: DrawableObject) {
        if !remote.has_id() {
            remote.id = self.ids.generate(&format!("{}_recovered", remote.kind()), None);
            warn!(id = %remote.id, kind = %remote.kind(), "recovered peer object without id");
        }
        let Some(local) = self.store.get(&remote.id) else {
            self.store.add(remote);
            return;
        };
        match self.merge.resolve_remote_add(local, &remote) {
            Resolution::KeepLocal => debug!(id = %remote.id, "peer add of known object, keeping local copy"),
            Resolution::TakeRemote => {
                debug!(id = %remote.id, "peer add of known object, taking remote copy");
                self.store.replace(remote);
            }
        }
    }

    fn ingest_updated(&mut self, id: &str, patch: &ObjectPatch) {
        let Some(local) = self.store.get(id) else {
            debug!(%id, "peer update for unknown object ignored");
            return;
        };
        if !self.merge.accept_remote_update(local, patch, self.pending.contains_key(id)) {
            debug!(%id, "peer update rejected by merge policy");
            return;
        }
        if let Err(e) = self.store.update(id, patch) {
            warn!(%id, error = %e, code = e.error_code(), "peer update rejected");
        }
    }

    // =========================================================================
    // GESTURES
    // =========================================================================

    fn pointer_down(&mut self, tool: Tool, at: Point) {
        let id = tool_kind(tool)
            .map(|kind| self.ids.generate(kind.as_str(), Some(self.user.user_id.as_str())))
            .unwrap_or_default();
        let event = self.gesture.pointer_down(tool, at, &self.style, id, &mut self.store);
        self.throttle.reset();
        self.last_pointer = Some(at);
        self.apply_gesture(event);
    }

    fn pointer_move(&mut self, at: Point) {
        if !self.gesture.is_active() {
            return;
        }
        self.gesture.pointer_move(at, &mut self.store);
        self.last_pointer = Some(at);
        if self.throttle.admit(Instant::now()) {
            self.emit_cursor(at);
        }
    }

    fn pointer_up(&mut self) {
        if self.gesture.is_active()
            && let Some(at) = self.last_pointer
        {
            self.emit_cursor(at);
        }
        let event = self.gesture.pointer_up(self.min_shape_size, &self.store);
        self.throttle.reset();
        self.apply_gesture(event);
    }

    fn apply_gesture(&mut self, event: GestureEvent) {
        match event {
            GestureEvent::None => {}
            GestureEvent::Create(object) => {
                self.create(object);
            }
            GestureEvent::Move { id, patch } => {
                if let Err(e) = self.update(&id, patch) {
                    warn!(%id, error = %e, code = e.error_code(), "drag result rejected");
                }
            }
        }
    }

    // =========================================================================
    // PLUMBING
    // =========================================================================

    fn reconnect(&mut self, reply: oneshot::Sender<ConnectivityMode>) {
        let api = Arc::clone(&self.api);
        let tracker = Arc::clone(&self.tracker);
        self.spawn_call(async move {
            let mode = tracker.probe(api.as_ref()).await;
            let _ = reply.send(mode);
            Settlement::Probed
        });
    }

    fn sweep(&mut self) {
        let report = self.store.dedupe(self.ids.as_ref());
        if !report.is_clean() {
            warn!(recovered = report.recovered.len(), dropped = report.dropped, "dedupe sweep repaired store");
        }
    }

    fn spawn_call<F>(&mut self, call: F)
    where
        F: Future<Output = Settlement> + Send + 'static,
    {
        self.in_flight += 1;
        let settle_tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let settlement = call.await;
            if settle_tx.send(settlement).is_err() {
                debug!("session gone before backend call settled");
            }
        });
    }

    fn mark_pending(&mut self, id: &str) {
        *self.pending.entry(id.to_owned()).or_default() += 1;
    }

    fn unmark_pending(&mut self, id: &str) {
        if let Some(count) = self.pending.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(id);
            }
        }
    }

    fn emit(&self, action: UpdateAction) {
        self.transport.emit(OutboundEvent::WhiteboardUpdate(WhiteboardUpdate {
            whiteboard_id: self.whiteboard_id.clone(),
            action,
        }));
    }

    fn emit_cursor(&self, at: Point) {
        self.transport.emit(OutboundEvent::CursorMove(CursorMove {
            whiteboard_id: self.whiteboard_id.clone(),
            user_id: self.user.user_id.clone(),
            user_name: self.user.user_name.clone(),
            x: at.x,
            y: at.y,
            color: self.local_color.to_owned(),
        }));
    }

    fn notify_error(&self, code: &'static str, message: String) {
        warn!(code, %message, "raising error notice");
        let _ = self.notice_tx.send(Notice::Error { code, message });
    }

    fn snapshot(&self) -> Snapshot {
        let mut pending: Vec<String> = self.pending.keys().cloned().collect();
        pending.sort();
        Snapshot {
            whiteboard_id: self.whiteboard_id.clone(),
            offline_only: self.offline_only,
            objects: self.store.to_vec(),
            draft: self.gesture.draft().cloned(),
            collaborators: self.presence.list(),
            mode: self.tracker.mode(),
            pending,
            revision: self.store.revision(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn wake_waiters(&mut self) {
        if self.in_flight > 0 || self.waiters.is_empty() {
            return;
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

async fn recv_inbound(inbound: &mut Option<mpsc::Receiver<InboundEvent>>) -> Option<InboundEvent> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
