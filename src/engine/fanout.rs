//! Room fanout
//!
//! Messages are encoded once and the same text frame is queued for every target.

use crate::protocol::OutboundMessage;
use crate::registry::Room;
use crate::session::Connection;

/// Send to the publisher and every viewer of a room
///
/// Returns the number of connections the message was queued for.
pub fn broadcast(room: &Room, message: &OutboundMessage) -> usize {
    send_all(room.audience(), message)
}

/// Send to the viewers of a room, skipping `except`
///
/// Teardown passes the retired owner here, since the owner gets its own reply.
pub fn notify_viewers(room: &Room, except: Option<&Connection>, message: &OutboundMessage) -> usize {
    send_all(room.viewers().filter(|v| Some(*v) != except), message)
}

fn send_all<'a>(targets: impl IntoIterator<Item = &'a Connection>, message: &OutboundMessage) -> usize {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode broadcast");
            return 0;
        }
    };

    targets
        .into_iter()
        .filter(|conn| conn.send_text(text.clone()))
        .count()
}
