//! Engine events
//!
//! Everything that can change room state arrives as an [`Event`] on the engine's
//! channel: transport callbacks, encoder observers and control requests.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::session::Connection;
use crate::stats::ServerStats;

/// Input to the engine's event loop
#[derive(Debug)]
pub enum Event {
    /// A client connected
    Opened {
        /// The new connection
        conn: Connection,
    },

    /// A client sent a frame
    Message {
        /// Sender
        conn: Connection,
        /// Raw frame payload (UTF-8 JSON)
        payload: Bytes,
    },

    /// A client disconnected
    Closed {
        /// The closed connection
        conn: Connection,
    },

    /// An encoder wrote a diagnostic line
    EncoderDiagnostic {
        /// Room the encoder belongs to
        stream_id: String,
        /// Encoder generation that produced the line
        generation: u64,
        /// Output line, trimmed
        line: String,
    },

    /// An encoder process exited
    EncoderExited {
        /// Room the encoder belonged to
        stream_id: String,
        /// Encoder generation that exited
        generation: u64,
        /// Exit code (`None` when killed by a signal)
        code: Option<i32>,
    },

    /// Request a statistics snapshot
    Stats {
        /// Where to send the snapshot
        reply: oneshot::Sender<ServerStats>,
    },

    /// Close every stream and stop the loop
    Shutdown {
        /// Signalled once all teardowns have finished
        done: oneshot::Sender<()>,
    },
}
