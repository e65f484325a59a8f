//! Wire protocol between browser clients and the ingest server
//!
//! Clients talk JSON over a WebSocket. Publishers open a room with `start-stream`,
//! push media with `video-chunk` and close it with `stop-stream`; viewers subscribe
//! with `join-stream` and only receive status and diagnostic messages.
//!
//! ```text
//! publisher                     server                       viewer
//!     │ start-stream ─────────────►│                             │
//!     │◄──────────── stream-started│                             │
//!     │                            │◄──────────────── join-stream │
//!     │                            │ joined-stream ──────────────►│
//!     │ video-chunk ──────────────►│──► encoder stdin            │
//!     │◄─────────────── stream-error (encoder output) ───────────►│
//!     │ stop-stream ──────────────►│                             │
//!     │◄──────────── stream-stopped│ stream-closed ──────────────►│
//! ```

pub mod chunk;
pub mod error;
pub mod message;

pub use chunk::ChunkPayload;
pub use error::{ProtocolError, Rejection};
pub use message::{InboundMessage, MessageType, OutboundMessage};
