//! Protocol state machine
//!
//! The [`Engine`] owns the room registry and the encoder supervisor and processes
//! one [`Event`] at a time. Nothing else mutates room state, so ordering within a
//! room is simply event arrival order.

use tokio::sync::mpsc;

use super::config::EngineConfig;
use super::event::Event;
use super::fanout;
use crate::encoder::{EncoderLauncher, PipeError, Stream, Supervisor};
use crate::protocol::{
    ChunkPayload, InboundMessage, MessageType, OutboundMessage, ProtocolError, Rejection,
};
use crate::registry::{Room, RoomRegistry};
use crate::session::Connection;
use crate::stats::{EngineCounters, ServerStats};

/// Result of handling one inbound message: an optional direct reply
type Reply = Result<Option<OutboundMessage>, Rejection>;

/// Room and stream supervision engine
pub struct Engine<L: EncoderLauncher> {
    registry: RoomRegistry,
    supervisor: Supervisor<L>,
    counters: EngineCounters,
}

impl<L: EncoderLauncher> Engine<L> {
    /// Create an engine; encoder observers post their events to `events`
    pub fn new(config: EngineConfig, launcher: L, events: mpsc::Sender<Event>) -> Self {
        Self {
            registry: RoomRegistry::new(),
            supervisor: Supervisor::new(config.encoder, launcher, events),
            counters: EngineCounters::new(),
        }
    }

    /// Room registry
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Running counters
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Run the event loop until a shutdown event arrives
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        tracing::info!("Engine started");

        while let Some(event) = events.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }

        tracing::info!("Engine stopped");
    }

    /// Process a single event
    ///
    /// Returns `false` once the engine has shut down.
    pub async fn handle_event(&mut self, event: Event) -> bool {
        self.supervisor.reap();

        match event {
            Event::Opened { conn } => self.on_open(&conn),
            Event::Message { conn, payload } => self.on_message(&conn, &payload),
            Event::Closed { conn } => self.on_close(&conn),
            Event::EncoderDiagnostic {
                stream_id,
                generation,
                line,
            } => self.on_encoder_output(&stream_id, generation, line),
            Event::EncoderExited {
                stream_id,
                generation,
                code,
            } => self.on_encoder_exit(&stream_id, generation, code),
            Event::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Event::Shutdown { done } => {
                self.shutdown().await;
                let _ = done.send(());
                return false;
            }
        }

        true
    }

    /// Record a new connection
    pub fn on_open(&mut self, conn: &Connection) {
        self.counters.connection_opened();
        tracing::info!(conn = conn.id(), peer = ?conn.peer_addr(), "Client connected");
    }

    /// Handle one inbound frame, replying to the sender when required
    pub fn on_message(&mut self, conn: &Connection, payload: &[u8]) {
        self.counters.messages_received += 1;

        let result = InboundMessage::parse(payload).and_then(|msg| self.dispatch(conn, msg));

        match result {
            Ok(Some(reply)) => {
                conn.send(&reply);
            }
            Ok(None) => {}
            Err(rejection) => {
                self.counters.protocol_errors += 1;
                tracing::debug!(conn = conn.id(), error = %rejection, "Message rejected");
                conn.send(&rejection.to_reply());
            }
        }
    }

    fn dispatch(&mut self, conn: &Connection, msg: InboundMessage) -> Reply {
        let InboundMessage {
            kind,
            stream_id,
            chunk,
            stream_kind,
        } = msg;

        tracing::trace!(conn = conn.id(), stream = %stream_id, kind = %kind, "Message");

        match kind {
            MessageType::StartStream => self.start_stream(conn, &stream_id, stream_kind),
            MessageType::JoinStream => self.join_stream(conn, &stream_id),
            MessageType::VideoChunk => self.video_chunk(conn, &stream_id, chunk),
            MessageType::StopStream => self.stop_stream(conn, &stream_id),
        }
    }

    fn start_stream(
        &mut self,
        conn: &Connection,
        stream_id: &str,
        stream_kind: Option<String>,
    ) -> Reply {
        if self.registry.is_live(stream_id) {
            return Err(ProtocolError::AlreadyActive.for_stream(stream_id));
        }

        let stream = match self.supervisor.start(stream_id, conn.clone(), stream_kind, 0) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(stream = %stream_id, error = %e, "Failed to spawn encoder");
                return Err(ProtocolError::EncoderUnavailable.for_stream(stream_id));
            }
        };
        self.counters.encoder_spawns += 1;

        self.registry.get_or_create(stream_id).set_publisher(stream);

        tracing::info!(stream = %stream_id, conn = conn.id(), "Stream started");

        Ok(Some(OutboundMessage::StreamStarted {
            stream_id: stream_id.to_string(),
        }))
    }

    fn join_stream(&mut self, conn: &Connection, stream_id: &str) -> Reply {
        let room = self
            .registry
            .get_mut(stream_id)
            .filter(|room| room.has_publisher())
            .ok_or_else(|| ProtocolError::NotActive.for_stream(stream_id))?;

        room.add_viewer(conn.clone());

        tracing::info!(
            stream = %stream_id,
            conn = conn.id(),
            viewers = room.viewer_count(),
            "Viewer joined"
        );

        Ok(Some(OutboundMessage::JoinedStream {
            stream_id: stream_id.to_string(),
        }))
    }

    fn video_chunk(
        &mut self,
        conn: &Connection,
        stream_id: &str,
        chunk: Option<serde_json::Value>,
    ) -> Reply {
        let chunk = chunk.ok_or_else(|| ProtocolError::NoChunk.for_stream(stream_id))?;

        let stream = self
            .registry
            .get_mut(stream_id)
            .and_then(Room::publisher_mut)
            .ok_or_else(|| ProtocolError::NoActiveStream.for_stream(stream_id))?;

        if !stream.is_owned_by(conn) {
            return Err(ProtocolError::ChunkNotAuthorized.for_stream(stream_id));
        }

        let payload = ChunkPayload::from_value(&chunk).map_err(|e| e.for_stream(stream_id))?;
        if payload.is_empty() {
            return Ok(None);
        }

        let bytes = payload.into_bytes();
        let len = bytes.len();

        match stream.write(bytes) {
            Ok(()) => self.counters.chunk_forwarded(len),
            Err(e @ PipeError::Full { .. }) => {
                self.counters.chunks_dropped += 1;
                tracing::warn!(stream = %stream_id, len, error = %e, "Chunk dropped");
            }
            Err(PipeError::Closed) => {
                self.counters.chunks_dropped += 1;
                tracing::debug!(stream = %stream_id, len, "Encoder input closed, chunk dropped");
            }
        }

        // Data path: no acknowledgement
        Ok(None)
    }

    fn stop_stream(&mut self, conn: &Connection, stream_id: &str) -> Reply {
        let authorized = self
            .registry
            .get(stream_id)
            .is_some_and(|room| room.is_publisher(conn));
        if !authorized {
            return Err(ProtocolError::StopNotAuthorized.for_stream(stream_id));
        }

        self.close_room(stream_id);
        tracing::info!(stream = %stream_id, conn = conn.id(), "Stream stopped by publisher");

        Ok(Some(OutboundMessage::StreamStopped {
            stream_id: stream_id.to_string(),
        }))
    }

    /// Disconnect cleanup: tear down published rooms, leave watched ones
    pub fn on_close(&mut self, conn: &Connection) {
        self.counters.connection_closed();

        for stream_id in self.registry.published_by(conn) {
            tracing::info!(stream = %stream_id, conn = conn.id(), "Publisher disconnected");
            self.close_room(&stream_id);
        }

        let left: Vec<String> = self
            .registry
            .iter_mut()
            .filter_map(|(stream_id, room)| room.remove_viewer(conn).then(|| stream_id.clone()))
            .collect();
        for stream_id in left {
            tracing::debug!(stream = %stream_id, conn = conn.id(), "Viewer left");
            self.registry.prune(&stream_id);
        }

        tracing::info!(conn = conn.id(), "Client disconnected");
    }

    /// Relay an encoder diagnostic line to the room
    pub fn on_encoder_output(&mut self, stream_id: &str, generation: u64, line: String) {
        let Some(room) = self.registry.get(stream_id) else {
            return;
        };
        if room.publisher().map(Stream::generation) != Some(generation) {
            tracing::trace!(stream = %stream_id, generation, "Output from stale encoder ignored");
            return;
        }

        tracing::warn!(stream = %stream_id, generation, output = %line, "Encoder error output");

        fanout::broadcast(
            room,
            &OutboundMessage::StreamError {
                stream_id: stream_id.to_string(),
                error: line,
            },
        );
    }

    /// Apply the retry policy to an exited encoder
    pub fn on_encoder_exit(&mut self, stream_id: &str, generation: u64, code: Option<i32>) {
        let Some(room) = self.registry.get_mut(stream_id) else {
            tracing::debug!(stream = %stream_id, generation, "Exit of retired encoder");
            return;
        };
        if room.publisher().map(Stream::generation) != Some(generation) {
            tracing::debug!(stream = %stream_id, generation, "Exit of replaced encoder");
            return;
        }
        let Some(stream) = room.take_publisher() else {
            return;
        };

        let owner = stream.owner().clone();
        let retry_count = stream.retry_count();

        if self.supervisor.should_retry(code, retry_count) {
            match self.supervisor.restart(stream) {
                Ok(replacement) => {
                    self.counters.encoder_spawns += 1;
                    self.counters.encoder_restarts += 1;
                    self.registry.get_or_create(stream_id).set_publisher(replacement);
                    return;
                }
                Err(e) => {
                    self.counters.streams_closed += 1;
                    tracing::error!(stream = %stream_id, error = %e, "Failed to restart encoder");
                }
            }
        } else {
            if code == Some(0) {
                tracing::info!(stream = %stream_id, retry = retry_count, "Encoder finished");
            } else {
                tracing::warn!(
                    stream = %stream_id,
                    code = ?code,
                    retry = retry_count,
                    "Encoder failed, retries exhausted"
                );
            }
            self.end_stream(stream);
        }

        self.close_room(stream_id);
        owner.send(&OutboundMessage::StreamClosed {
            stream_id: stream_id.to_string(),
        });
    }

    /// Tear down a room: retire its stream, tell viewers, drop the entry
    ///
    /// Idempotent. Returns the owner of the stream that was retired, if any.
    fn close_room(&mut self, stream_id: &str) -> Option<Connection> {
        let mut room = self.registry.delete(stream_id)?;

        let owner = room.take_publisher().map(|stream| {
            let owner = stream.owner().clone();
            self.end_stream(stream);
            owner
        });

        fanout::notify_viewers(
            &room,
            owner.as_ref(),
            &OutboundMessage::StreamClosed {
                stream_id: stream_id.to_string(),
            },
        );

        owner
    }

    fn end_stream(&mut self, stream: Stream) {
        self.counters.streams_closed += 1;
        self.supervisor.retire(stream);
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ServerStats {
        let streams = self
            .registry
            .iter()
            .filter_map(|(_, room)| room.publisher().map(|s| s.stats(room.viewer_count())))
            .collect();

        ServerStats::from_counters(&self.counters, self.registry.len(), streams)
    }

    /// Close every room and wait for all encoders to be torn down
    pub async fn shutdown(&mut self) {
        let stream_ids = self.registry.stream_ids();
        tracing::info!(rooms = stream_ids.len(), "Closing all streams");

        for stream_id in stream_ids {
            if let Some(owner) = self.close_room(&stream_id) {
                owner.send(&OutboundMessage::StreamClosed { stream_id });
            }
        }

        self.supervisor.drain().await;
    }
}
