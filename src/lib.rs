//! Client-side object reconciliation for a collaborative whiteboard.
//!
//! DESIGN
//! ======
//! Local edits are applied optimistically, broadcast to peers over a
//! realtime transport, and persisted to the REST backend in the background.
//! Peer events are merged into the same store. When the backend cannot be
//! reached the session keeps working locally and skips writes.
//!
//! LAYOUT
//! ======
//! - `object`, `store`, `ident`: the data model and its invariants
//! - `api`, `transport`, `connectivity`: the outside world
//! - `merge`, `gesture`, `presence`: policy and interaction state
//! - `session`: the single-writer engine tying it together

pub mod api;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod gesture;
pub mod ident;
pub mod merge;
pub mod object;
pub mod presence;
pub mod session;
pub mod store;
pub mod transport;

pub use api::{HttpApi, Whiteboard, WhiteboardApi};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityMode, ConnectivityTracker};
pub use error::{ApiError, ErrorCode, ObjectError, SessionError};
pub use gesture::{DrawStyle, Tool};
pub use merge::{MergePolicy, MergeStrategy};
pub use object::{DrawableObject, ObjectPatch, Point, Shape, ShapeKind};
pub use session::{LocalUser, Notice, Session, SessionHandle, SessionIo, Snapshot};
pub use store::ObjectStore;
pub use transport::{ChannelTransport, InboundEvent, NullTransport, OutboundEvent, Transport, WsTransport};
