//! Room registry for publisher/viewer routing
//!
//! The registry is the single source of truth for which rooms exist, who
//! publishes into each and who is watching.
//!
//! # Architecture
//!
//! ```text
//!                           Engine (single task)
//!                     ┌───────────────────────────┐
//!                     │ rooms: HashMap<streamId,  │
//!                     │   Room {                  │
//!                     │     publisher: Stream?,   │
//!                     │     viewers: {Conn},      │
//!                     │   }                       │
//!                     │ >                         │
//!                     └─────────────┬─────────────┘
//!                                   │
//!         ┌─────────────────────────┼──────────────────────┐
//!         │                         │                      │
//!         ▼                         ▼                      ▼
//!    [Publisher]               [Viewer]               [Viewer]
//!    video-chunk ──► encoder   stream-error           stream-closed
//! ```
//!
//! Invariants kept by the engine:
//!
//! - at most one stream occupies a room's publisher slot
//! - a room with no publisher and no viewers is removed

pub mod room;
pub mod store;

pub use room::Room;
pub use store::RoomRegistry;
