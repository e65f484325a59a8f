//! Media chunk payload decoding
//!
//! Browsers serialize binary data into JSON in a few different ways depending on
//! which object was handed to `JSON.stringify`:
//!
//! ```text
//! Buffer         -> {"type":"Buffer","data":[26,69,223]}
//! Uint8Array     -> {"0":26,"1":69,"2":223}
//! number[]       -> [26,69,223]
//! ```
//!
//! All three normalize to the same byte sequence. Anything else is rejected.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::error::ProtocolError;

/// Decoded chunk payload, tagged by the shape it arrived in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPayload {
    /// Serialized binary buffer (`{"type":"Buffer","data":[..]}`)
    Buffer(Vec<u8>),
    /// Typed numeric view (`{"0":b0,"1":b1,..}`)
    TypedView(Vec<u8>),
    /// Plain numeric array (`[b0,b1,..]`)
    Array(Vec<u8>),
}

impl ChunkPayload {
    /// Decode a raw JSON chunk
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Array(items) => byte_array(items).map(ChunkPayload::Array),
            Value::Object(fields) if is_buffer(fields) => match fields.get("data") {
                Some(Value::Array(items)) => byte_array(items).map(ChunkPayload::Buffer),
                _ => Err(ProtocolError::InvalidChunk),
            },
            Value::Object(fields) => typed_view(fields).map(ChunkPayload::TypedView),
            _ => Err(ProtocolError::InvalidChunk),
        }
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if the payload carries no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            ChunkPayload::Buffer(data) | ChunkPayload::TypedView(data) | ChunkPayload::Array(data) => {
                data
            }
        }
    }

    /// Canonical byte sequence for the encoder input
    pub fn into_bytes(self) -> Bytes {
        match self {
            ChunkPayload::Buffer(data) | ChunkPayload::TypedView(data) | ChunkPayload::Array(data) => {
                Bytes::from(data)
            }
        }
    }
}

fn is_buffer(fields: &Map<String, Value>) -> bool {
    fields.get("type").and_then(Value::as_str) == Some("Buffer")
}

fn byte(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|n| u8::try_from(n).ok())
}

fn byte_array(items: &[Value]) -> Result<Vec<u8>, ProtocolError> {
    items
        .iter()
        .map(|v| byte(v).ok_or(ProtocolError::InvalidChunk))
        .collect()
}

/// Index keys must cover `0..len` exactly once
fn typed_view(fields: &Map<String, Value>) -> Result<Vec<u8>, ProtocolError> {
    if fields.is_empty() {
        return Err(ProtocolError::InvalidChunk);
    }

    let mut slots: Vec<Option<u8>> = vec![None; fields.len()];

    for (key, value) in fields {
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProtocolError::InvalidChunk);
        }
        let index: usize = key.parse().map_err(|_| ProtocolError::InvalidChunk)?;
        let slot = slots.get_mut(index).ok_or(ProtocolError::InvalidChunk)?;
        *slot = Some(byte(value).ok_or(ProtocolError::InvalidChunk)?);
    }

    slots
        .into_iter()
        .map(|s| s.ok_or(ProtocolError::InvalidChunk))
        .collect()
}
