//! Inbound and outbound control messages
//!
//! Inbound messages are JSON objects of the form
//! `{ "type", "streamId", "chunk"?, "streamKind"? }`. Validation happens in a fixed
//! order so that the first failing check decides the error reply:
//!
//! 1. the payload must be a JSON object (an array passes, having no fields)
//! 2. `streamId` must be a non-empty string
//! 3. `type` must be a recognised kind
//!
//! The `chunk` field is kept as raw JSON here; it is only decoded once the sender
//! has been authorized (see [`ChunkPayload`](super::chunk::ChunkPayload)).

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{ProtocolError, Rejection};

/// Recognised inbound message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Become the publisher of a room and spawn its encoder
    StartStream,
    /// Subscribe to a room's status messages
    JoinStream,
    /// Media bytes for the room's encoder
    VideoChunk,
    /// Stop publishing and tear the room down
    StopStream,
}

impl MessageType {
    /// Parse the wire name of a message kind
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "start-stream" => Some(MessageType::StartStream),
            "join-stream" => Some(MessageType::JoinStream),
            "video-chunk" => Some(MessageType::VideoChunk),
            "stop-stream" => Some(MessageType::StopStream),
            _ => None,
        }
    }

    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::StartStream => "start-stream",
            MessageType::JoinStream => "join-stream",
            MessageType::VideoChunk => "video-chunk",
            MessageType::StopStream => "stop-stream",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Message kind
    pub kind: MessageType,
    /// Target room
    pub stream_id: String,
    /// Undecoded chunk payload (`None` when absent or null)
    pub chunk: Option<Value>,
    /// Input format hint for the encoder (`-f <kind>`)
    pub stream_kind: Option<String>,
}

impl InboundMessage {
    /// Parse and validate a raw frame
    pub fn parse(payload: &[u8]) -> Result<Self, Rejection> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|_| ProtocolError::InvalidFormat.unattributed())?;

        let mut fields = match value {
            Value::Object(fields) => fields,
            // Arrays count as objects and fail on the missing streamId instead
            Value::Array(_) => Map::new(),
            _ => return Err(ProtocolError::InvalidFormat.unattributed()),
        };

        let stream_id = match fields.remove("streamId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => return Err(ProtocolError::StreamIdRequired.unattributed()),
        };

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .and_then(MessageType::from_wire)
            .ok_or_else(|| ProtocolError::UnknownType.for_stream(stream_id.as_str()))?;

        let chunk = fields.remove("chunk").filter(|c| !c.is_null());

        // Empty or non-string hints are treated as absent
        let stream_kind = match fields.remove("streamKind") {
            Some(Value::String(k)) if !k.is_empty() => Some(k),
            _ => None,
        };

        Ok(Self {
            kind,
            stream_id,
            chunk,
            stream_kind,
        })
    }
}

/// Messages sent from the server to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Publisher accepted, encoder spawned
    StreamStarted {
        /// Room id
        stream_id: String,
    },
    /// Viewer added to the room
    JoinedStream {
        /// Room id
        stream_id: String,
    },
    /// Publisher-requested stop completed
    StreamStopped {
        /// Room id
        stream_id: String,
    },
    /// Stream ended (encoder finished, retries exhausted or publisher left)
    StreamClosed {
        /// Room id
        stream_id: String,
    },
    /// Diagnostic output from the encoder
    StreamError {
        /// Room id
        stream_id: String,
        /// Encoder output line
        error: String,
    },
    /// Request rejected
    Error {
        /// Room id, when the request could be attributed to one
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        /// Human readable reason
        error: String,
    },
}

impl OutboundMessage {
    /// Serialize to a JSON text frame
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
