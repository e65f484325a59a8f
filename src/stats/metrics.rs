//! Statistics for the ingest engine

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::encoder::StreamPhase;
use crate::session::ConnectionId;

/// Running counters kept by the engine
#[derive(Debug, Clone)]
pub struct EngineCounters {
    /// When the engine started
    pub started_at: Instant,
    /// Total connections ever opened
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
    /// Inbound messages processed
    pub messages_received: u64,
    /// Messages answered with an `error` reply
    pub protocol_errors: u64,
    /// Chunks queued for encoders
    pub chunks_forwarded: u64,
    /// Bytes queued for encoders
    pub bytes_forwarded: u64,
    /// Chunks dropped because an encoder input was backed up or closed
    pub chunks_dropped: u64,
    /// Encoder processes spawned (including restarts)
    pub encoder_spawns: u64,
    /// Restarts after abnormal exits
    pub encoder_restarts: u64,
    /// Streams that ended (any reason)
    pub streams_closed: u64,
}

impl Default for EngineCounters {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: 0,
            active_connections: 0,
            messages_received: 0,
            protocol_errors: 0,
            chunks_forwarded: 0,
            bytes_forwarded: 0,
            chunks_dropped: 0,
            encoder_spawns: 0,
            encoder_restarts: 0,
            streams_closed: 0,
        }
    }
}

impl EngineCounters {
    /// Create new counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Time since the engine started
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record an opened connection
    pub fn connection_opened(&mut self) {
        self.total_connections += 1;
        self.active_connections += 1;
    }

    /// Record a closed connection
    pub fn connection_closed(&mut self) {
        self.active_connections = self.active_connections.saturating_sub(1);
    }

    /// Record a chunk queued for an encoder
    pub fn chunk_forwarded(&mut self, len: usize) {
        self.chunks_forwarded += 1;
        self.bytes_forwarded += len as u64;
    }
}

/// Per-stream snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    /// Room id
    pub stream_id: String,
    /// Publishing connection
    pub owner: ConnectionId,
    /// Lifecycle phase
    pub phase: StreamPhase,
    /// Consecutive abnormal restarts
    pub retry_count: u32,
    /// OS process id of the current encoder
    pub pid: Option<u32>,
    /// Input format hint given at start
    pub stream_kind: Option<String>,
    /// Subscribed viewers
    pub viewers: usize,
    /// Chunks queued to the current encoder
    pub chunks_written: u64,
    /// Bytes queued to the current encoder
    pub bytes_written: u64,
    /// Bytes queued but not yet accepted by the encoder
    pub bytes_buffered: usize,
    /// Seconds since the current encoder was spawned
    pub uptime_secs: u64,
}

/// Server-wide snapshot served by the stats endpoint
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Seconds since the engine started
    pub uptime_secs: u64,
    /// Total connections ever
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
    /// Rooms in the registry
    pub rooms: usize,
    /// Rooms with a live encoder
    pub active_streams: usize,
    /// Inbound messages processed
    pub messages_received: u64,
    /// Messages answered with an error
    pub protocol_errors: u64,
    /// Chunks queued for encoders
    pub chunks_forwarded: u64,
    /// Bytes queued for encoders
    pub bytes_forwarded: u64,
    /// Chunks dropped on backlog or closed input
    pub chunks_dropped: u64,
    /// Encoder processes spawned
    pub encoder_spawns: u64,
    /// Restarts after abnormal exits
    pub encoder_restarts: u64,
    /// Streams that ended
    pub streams_closed: u64,
    /// Per-stream detail
    pub streams: Vec<StreamStats>,
}

impl ServerStats {
    /// Build a snapshot from counters and per-stream detail
    pub fn from_counters(counters: &EngineCounters, rooms: usize, streams: Vec<StreamStats>) -> Self {
        Self {
            uptime_secs: counters.uptime().as_secs(),
            total_connections: counters.total_connections,
            active_connections: counters.active_connections,
            rooms,
            active_streams: streams.len(),
            messages_received: counters.messages_received,
            protocol_errors: counters.protocol_errors,
            chunks_forwarded: counters.chunks_forwarded,
            bytes_forwarded: counters.bytes_forwarded,
            chunks_dropped: counters.chunks_dropped,
            encoder_spawns: counters.encoder_spawns,
            encoder_restarts: counters.encoder_restarts,
            streams_closed: counters.streams_closed,
            streams,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_new() {
        let counters = EngineCounters::new();
        assert_eq!(counters.total_connections, 0);
        assert_eq!(counters.active_connections, 0);
        assert_eq!(counters.chunks_forwarded, 0);
        assert_eq!(counters.encoder_restarts, 0);
    }

    #[test]
    fn test_connection_accounting() {
        let mut counters = EngineCounters::new();
        counters.connection_opened();
        counters.connection_opened();
        counters.connection_closed();

        assert_eq!(counters.total_connections, 2);
        assert_eq!(counters.active_connections, 1);

        // Never underflows
        counters.connection_closed();
        counters.connection_closed();
        assert_eq!(counters.active_connections, 0);
    }

    #[test]
    fn test_chunk_accounting() {
        let mut counters = EngineCounters::new();
        counters.chunk_forwarded(1000);
        counters.chunk_forwarded(24);

        assert_eq!(counters.chunks_forwarded, 2);
        assert_eq!(counters.bytes_forwarded, 1024);
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut counters = EngineCounters::new();
        counters.connection_opened();

        let stream = StreamStats {
            stream_id: "room1".into(),
            owner: 1,
            phase: StreamPhase::Running,
            retry_count: 0,
            pid: Some(4242),
            stream_kind: None,
            viewers: 2,
            chunks_written: 10,
            bytes_written: 4096,
            bytes_buffered: 0,
            uptime_secs: 3,
        };
        let stats = ServerStats::from_counters(&counters, 1, vec![stream]);

        assert_eq!(stats.active_streams, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["activeConnections"], 1);
        assert_eq!(json["streams"][0]["streamId"], "room1");
        assert_eq!(json["streams"][0]["phase"], "running");
        assert_eq!(json["streams"][0]["pid"], 4242);
        assert!(json["streams"][0]["streamKind"].is_null());
    }
}
