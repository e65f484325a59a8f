//! Client session handles

pub mod connection;

pub use connection::{Connection, ConnectionId};
