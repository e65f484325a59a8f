//! Room registry implementation
//!
//! The registry maps stream ids to rooms. It doubles as the active-stream index:
//! a stream id is live exactly when its room holds a publisher, so there is no
//! second map that could disagree with it.
//!
//! The registry is owned by the engine task and only mutated from there, so it
//! needs no locking.

use std::collections::HashMap;

use super::room::Room;
use crate::encoder::Stream;
use crate::session::Connection;

/// Registry of all rooms
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room
    pub fn get(&self, stream_id: &str) -> Option<&Room> {
        self.rooms.get(stream_id)
    }

    /// Look up a room for mutation
    pub fn get_mut(&mut self, stream_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(stream_id)
    }

    /// Look up a room, creating an empty one if missing
    pub fn get_or_create(&mut self, stream_id: &str) -> &mut Room {
        self.rooms.entry(stream_id.to_string()).or_insert_with(|| {
            tracing::debug!(stream = %stream_id, "Room created");
            Room::new()
        })
    }

    /// Remove a room
    pub fn delete(&mut self, stream_id: &str) -> Option<Room> {
        let room = self.rooms.remove(stream_id);
        if room.is_some() {
            tracing::debug!(stream = %stream_id, "Room removed");
        }
        room
    }

    /// Remove a room if it has neither publisher nor viewers
    pub fn prune(&mut self, stream_id: &str) -> bool {
        if self.rooms.get(stream_id).is_some_and(Room::is_garbage) {
            self.delete(stream_id);
            true
        } else {
            false
        }
    }

    /// Live stream for a stream id, if any
    pub fn stream(&self, stream_id: &str) -> Option<&Stream> {
        self.rooms.get(stream_id).and_then(Room::publisher)
    }

    /// Check if a stream id has an active publisher
    pub fn is_live(&self, stream_id: &str) -> bool {
        self.stream(stream_id).is_some()
    }

    /// Stream ids of every room
    pub fn stream_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Stream ids of rooms where `conn` is the publisher
    pub fn published_by(&self, conn: &Connection) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.is_publisher(conn))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Iterate over all rooms
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Room)> {
        self.rooms.iter()
    }

    /// Iterate mutably over all rooms
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Room)> {
        self.rooms.iter_mut()
    }

    /// Number of rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if there are no rooms
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Number of rooms with a live stream
    pub fn active_stream_count(&self) -> usize {
        self.rooms.values().filter(|r| r.has_publisher()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create() {
        let mut registry = RoomRegistry::new();
        assert!(registry.get("room1").is_none());

        let (viewer, _rx) = Connection::new(1, None, 4);
        registry.get_or_create("room1").add_viewer(viewer.clone());

        // Second call returns the same room
        assert!(registry.get_or_create("room1").has_viewer(&viewer));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prune_only_garbage() {
        let mut registry = RoomRegistry::new();
        let (viewer, _rx) = Connection::new(1, None, 4);

        registry.get_or_create("empty");
        registry.get_or_create("watched").add_viewer(viewer);

        assert!(registry.prune("empty"));
        assert!(!registry.prune("watched"));
        assert!(!registry.prune("missing"));

        assert!(registry.get("empty").is_none());
        assert!(registry.get("watched").is_some());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut registry = RoomRegistry::new();
        registry.get_or_create("room1");

        assert!(registry.delete("room1").is_some());
        assert!(registry.delete("room1").is_none());
        assert!(registry.is_empty());
    }
}
