//! Protocol error types
//!
//! Every variant's `Display` output is the exact `error` string sent back on the wire.

use super::message::OutboundMessage;

/// Reason an inbound message was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not a JSON object
    #[error("Invalid message format")]
    InvalidFormat,
    /// `streamId` missing, empty or not a string
    #[error("streamId required")]
    StreamIdRequired,
    /// `type` is not one of the recognised kinds
    #[error("Unknown message type")]
    UnknownType,
    /// Room already has a publisher
    #[error("Stream already active")]
    AlreadyActive,
    /// Join requested for a room without a publisher
    #[error("Stream not active")]
    NotActive,
    /// Chunk sent by a connection that does not own the stream
    #[error("Not authorized to send video-chunks")]
    ChunkNotAuthorized,
    /// `chunk` field missing or null
    #[error("No chunk provided")]
    NoChunk,
    /// `chunk` present but not one of the accepted binary shapes
    #[error("Invalid chunk format")]
    InvalidChunk,
    /// Chunk sent for a stream id with no live encoder
    #[error("No active stream found")]
    NoActiveStream,
    /// Stop requested by a connection that does not own the stream
    #[error("Not authorized to stop stream")]
    StopNotAuthorized,
    /// Encoder process could not be spawned
    #[error("Failed to start encoder")]
    EncoderUnavailable,
}

impl ProtocolError {
    /// Attach the stream id the rejection refers to
    pub fn for_stream(self, stream_id: impl Into<String>) -> Rejection {
        Rejection {
            stream_id: Some(stream_id.into()),
            error: self,
        }
    }

    /// Rejection that carries no stream id (payload could not be attributed)
    pub fn unattributed(self) -> Rejection {
        Rejection {
            stream_id: None,
            error: self,
        }
    }
}

/// A rejected message, ready to be turned into an `error` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Stream id echoed back to the client, if known
    pub stream_id: Option<String>,
    /// What went wrong
    pub error: ProtocolError,
}

impl Rejection {
    /// Build the outbound `error` message for this rejection
    pub fn to_reply(&self) -> OutboundMessage {
        OutboundMessage::Error {
            stream_id: self.stream_id.clone(),
            error: self.error.to_string(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stream_id {
            Some(ref id) => write!(f, "{} ({})", self.error, id),
            None => write!(f, "{}", self.error),
        }
    }
}
