//! ingest-rs: WebSocket ingest and RTMP relay server
//!
//! This library accepts live media chunks from browser publishers over a WebSocket,
//! feeds them into a supervised encoder process (ffmpeg by default) that republishes
//! to an RTMP origin, and keeps any number of viewers informed about the stream state.
//!
//! - Room registry: one optional publisher and a viewer set per stream id
//! - Encoder supervision: spawn, feed, restart on crash, bounded retries
//! - Single event loop: all room state is mutated from one task, no locks
//!
//! # Example: Embedded Server
//!
//! ```no_run
//! use ingest_rs::{IngestServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = IngestServer::new(ServerConfig::default());
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod encoder;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use encoder::{EncoderConfig, EncoderLauncher, ProcessLauncher};
pub use engine::{Engine, EngineConfig, EngineHandle, Event};
pub use error::{Error, Result};
pub use protocol::{InboundMessage, OutboundMessage, ProtocolError};
pub use server::config::ServerConfig;
pub use server::listener::IngestServer;
pub use session::{Connection, ConnectionId};
