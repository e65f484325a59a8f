//! Room state
//!
//! A room is the broadcast channel for one stream id: an optional publisher
//! (the live encoder stream) and the set of connections watching it.

use std::collections::HashSet;

use crate::encoder::Stream;
use crate::session::Connection;

/// Entry for a single room in the registry
#[derive(Debug)]
pub struct Room {
    /// Live stream, if someone is publishing
    publisher: Option<Stream>,

    /// Subscribed connections (identity-compared)
    viewers: HashSet<Connection>,
}

impl Room {
    /// Create an empty room
    pub(super) fn new() -> Self {
        Self {
            publisher: None,
            viewers: HashSet::new(),
        }
    }

    /// Live stream, if any
    pub fn publisher(&self) -> Option<&Stream> {
        self.publisher.as_ref()
    }

    /// Mutable access to the live stream
    pub fn publisher_mut(&mut self) -> Option<&mut Stream> {
        self.publisher.as_mut()
    }

    /// Check if the room has an active publisher
    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// Check if `conn` owns the room's live stream
    pub fn is_publisher(&self, conn: &Connection) -> bool {
        self.publisher
            .as_ref()
            .is_some_and(|stream| stream.is_owned_by(conn))
    }

    /// Install a stream in the publisher slot, returning any previous occupant
    pub fn set_publisher(&mut self, stream: Stream) -> Option<Stream> {
        self.publisher.replace(stream)
    }

    /// Empty the publisher slot
    pub fn take_publisher(&mut self) -> Option<Stream> {
        self.publisher.take()
    }

    /// Subscribed viewers
    pub fn viewers(&self) -> impl Iterator<Item = &Connection> {
        self.viewers.iter()
    }

    /// Number of viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Check if `conn` is subscribed
    pub fn has_viewer(&self, conn: &Connection) -> bool {
        self.viewers.contains(conn)
    }

    /// Subscribe a connection; returns `false` if it already was
    pub fn add_viewer(&mut self, conn: Connection) -> bool {
        self.viewers.insert(conn)
    }

    /// Unsubscribe a connection; returns `false` if it was not subscribed
    pub fn remove_viewer(&mut self, conn: &Connection) -> bool {
        self.viewers.remove(conn)
    }

    /// Everyone who hears about this room: the publisher, then viewers
    ///
    /// A publisher that also joined as a viewer is listed once.
    pub fn audience(&self) -> Vec<&Connection> {
        let owner = self.publisher.as_ref().map(Stream::owner);
        owner
            .into_iter()
            .chain(self.viewers.iter().filter(|v| Some(*v) != owner))
            .collect()
    }

    /// A room nobody publishes to or watches must not stay registered
    pub fn is_garbage(&self) -> bool {
        self.publisher.is_none() && self.viewers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_set_semantics() {
        let mut room = Room::new();
        let (a, _rx_a) = Connection::new(1, None, 4);
        let (b, _rx_b) = Connection::new(2, None, 4);

        assert!(room.is_garbage());

        assert!(room.add_viewer(a.clone()));
        assert!(!room.add_viewer(a.clone()));
        assert!(room.add_viewer(b.clone()));
        assert_eq!(room.viewer_count(), 2);
        assert!(!room.is_garbage());

        assert!(room.remove_viewer(&a));
        assert!(!room.remove_viewer(&a));
        assert!(room.has_viewer(&b));
        assert!(!room.has_viewer(&a));
    }

    #[test]
    fn test_audience_without_publisher() {
        let mut room = Room::new();
        let (a, _rx_a) = Connection::new(1, None, 4);
        room.add_viewer(a.clone());

        let audience = room.audience();
        assert_eq!(audience, vec![&a]);
        assert!(!room.is_publisher(&a));
    }
}
