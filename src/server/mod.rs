//! HTTP and WebSocket front end
//!
//! Routes:
//!
//! - `GET /` health check
//! - `GET /stats` engine statistics as JSON
//! - `GET /stream` WebSocket upgrade into the ingest protocol

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::IngestServer;
