//! Room and stream supervision engine
//!
//! A single task owns every room and every encoder stream. Connection tasks and
//! encoder observers never touch that state directly; they post [`Event`]s and the
//! engine applies them one at a time.
//!
//! # Architecture
//!
//! ```text
//!   ws reader ──Opened/Message/Closed──┐
//!   ws reader ─────────────────────────┤
//!                                      ▼
//!   stderr reader ──Diagnostic──►  [event channel] ──► Engine
//!   exit watcher ───Exited──────►        ▲              │ RoomRegistry
//!                                        │              │ Supervisor
//!   EngineHandle ──Stats/Shutdown────────┘              │
//!                                                       ▼
//!                           per-connection queue ◄── replies, fanout
//!                           encoder stdin pipe  ◄── video chunks
//! ```
//!
//! Encoder events carry the generation of the process that produced them. Once a
//! stream has been restarted or retired, events from older generations no longer
//! match the room's publisher and are dropped.

pub mod config;
pub mod event;
pub mod fanout;
pub mod handle;
pub mod machine;

pub use config::EngineConfig;
pub use event::Event;
pub use handle::EngineHandle;
pub use machine::Engine;
