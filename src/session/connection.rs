//! Connection handles
//!
//! The engine never owns a socket. It holds cheap clones of a [`Connection`]: an id
//! used for identity comparison plus the sending half of the connection's outbound
//! queue. The transport task owns the receiving half and writes frames to the socket.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::OutboundMessage;

/// Unique identifier of a client connection
pub type ConnectionId = u64;

/// Handle to a connected client
///
/// Two handles are equal when they refer to the same connection, regardless of
/// which clone is being compared.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    tx: mpsc::Sender<String>,
}

impl Connection {
    /// Create a handle and the receiver the transport drains
    pub fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        (Self { id, peer_addr, tx }, rx)
    }

    /// Connection id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote peer address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Check if the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message for this connection
    ///
    /// Never blocks. Returns `false` when the message was dropped because the
    /// client is gone or too slow to drain its queue.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        match message.encode() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::error!(conn = self.id, error = %e, "Failed to encode message");
                false
            }
        }
    }

    /// Queue an already encoded frame
    pub fn send_text(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn = self.id, "Outbound queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn = self.id, "Connection closed, message dropped");
                false
            }
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
