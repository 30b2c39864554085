//! Realtime transport: peer events in, whiteboard updates out.
//!
//! DESIGN
//! ======
//! Events travel as JSON text messages `{"event": name, "data": {...}}`.
//! The session emits through the `Transport` trait (fire-and-forget) and
//! receives inbound events on an `mpsc` channel handed to it at spawn time.
//!
//! `WsTransport` owns a websocket split into a writer task draining an
//! unbounded queue and a reader task decoding frames into the inbound
//! channel. `ChannelTransport` is the in-process equivalent.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::object::{DrawableObject, ObjectPatch};

/// Capacity of the inbound event channel.
const INBOUND_CAPACITY: usize = 256;

// =============================================================================
// EVENTS
// =============================================================================

/// Events this client consumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    WhiteboardObjectAdded(ObjectAdded),
    WhiteboardObjectUpdated(ObjectUpdated),
    WhiteboardObjectDeleted(ObjectDeleted),
    WhiteboardCleared(Cleared),
    CursorUpdated(CursorUpdated),
    UserLeft(UserLeft),
}

impl InboundEvent {
    /// Whiteboard the event is addressed to, if it says.
    #[must_use]
    pub fn whiteboard_id(&self) -> Option<&str> {
        match self {
            Self::WhiteboardObjectAdded(e) => e.whiteboard_id.as_deref(),
            Self::WhiteboardObjectUpdated(e) => e.whiteboard_id.as_deref(),
            Self::WhiteboardObjectDeleted(e) => e.whiteboard_id.as_deref(),
            Self::WhiteboardCleared(e) => e.whiteboard_id.as_deref(),
            Self::CursorUpdated(e) => e.whiteboard_id.as_deref(),
            Self::UserLeft(e) => e.whiteboard_id.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAdded {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
    pub object: DrawableObject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdated {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
    pub object_id: String,
    pub updates: ObjectPatch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDeleted {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
    pub object_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cleared {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdated {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeft {
    #[serde(default)]
    pub whiteboard_id: Option<String>,
    pub user_id: String,
}

/// Events this client emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    WhiteboardUpdate(WhiteboardUpdate),
    CursorMove(CursorMove),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardUpdate {
    pub whiteboard_id: String,
    #[serde(flatten)]
    pub action: UpdateAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpdateAction {
    Add {
        object: DrawableObject,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        object_id: String,
        updates: ObjectPatch,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        object_id: String,
    },
    Clear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMove {
    pub whiteboard_id: String,
    pub user_id: String,
    pub user_name: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

/// Encode an outbound event as a JSON text message.
///
/// # Errors
///
/// Returns a serde error if a patch value cannot be encoded.
pub fn encode_event(event: &OutboundEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Decode an inbound JSON text message.
///
/// # Errors
///
/// Returns a serde error for unknown event names or malformed payloads.
pub fn decode_event(text: &str) -> Result<InboundEvent, serde_json::Error> {
    serde_json::from_str(text)
}

// =============================================================================
// TRANSPORT
// =============================================================================

pub trait Transport: Send + Sync {
    /// Queue `event` for delivery to peers. Never blocks; failures are logged.
    fn emit(&self, event: OutboundEvent);
}

/// Transport that drops everything, for sessions without a socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn emit(&self, event: OutboundEvent) {
        debug!(?event, "no transport, dropping event");
    }
}

/// In-process transport: emitted events land on an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn emit(&self, event: OutboundEvent) {
        if self.tx.send(event).is_err() {
            debug!("channel transport receiver dropped");
        }
    }
}

/// Websocket transport speaking the JSON event protocol.
#[derive(Debug, Clone)]
pub struct WsTransport {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl WsTransport {
    /// Connect to `url` and start the reader and writer tasks.
    ///
    /// Returns the transport and the receiver of decoded inbound events. The
    /// receiver closes when the socket does.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the websocket handshake fails.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<InboundEvent>), TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(Box::new(e)))?;
        info!(%url, "realtime transport connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundEvent>();
        let (in_tx, in_rx) = mpsc::channel::<InboundEvent>(INBOUND_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let text = match encode_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "websocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match decode_event(&text) {
                        Ok(event) => {
                            if in_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "ignoring undecodable event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket receive failed");
                        break;
                    }
                }
            }
            info!("realtime transport closed");
        });

        Ok((Self { tx: out_tx }, in_rx))
    }
}

impl Transport for WsTransport {
    fn emit(&self, event: OutboundEvent) {
        if self.tx.send(event).is_err() {
            warn!(error = %TransportError::Closed, "dropping outbound event");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
