//! Encoder process supervision
//!
//! Each published room is backed by one external encoder (ffmpeg by default) that
//! reads the publisher's media from standard input and pushes FLV to the origin.
//!
//! # Architecture
//!
//! ```text
//!                      Supervisor
//!            ┌───────────────────────────────┐
//!            │ launcher.launch(command)      │
//!            └──┬─────────────┬───────────┬──┘
//!               │             │           │
//!               ▼             ▼           ▼
//!         EncoderPipe    watch_exit   spawn_reader
//!         (stdin task)   (wait/kill)  (stderr lines)
//!               │             │           │
//!               ▼             └─────┬─────┘
//!          encoder stdin            ▼
//!                             Event channel ──► Engine
//! ```

pub mod command;
pub mod config;
pub mod diagnostics;
pub mod launcher;
pub mod pipe;
pub mod stream;

pub use command::{destination_url, EncoderCommand};
pub use config::EncoderConfig;
pub use launcher::{ChildProcess, EncoderChild, EncoderLauncher, EncoderProcess, ProcessLauncher};
pub use pipe::{EncoderPipe, PipeError};
pub use stream::{Stream, StreamPhase, Supervisor};
