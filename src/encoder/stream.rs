//! Supervised encoder streams
//!
//! A [`Stream`] binds one encoder process to the connection publishing into it.
//! The [`Supervisor`] spawns streams, attaches their observers and retires them.
//!
//! ```text
//!            start()                first chunk
//!   ──────► Starting ─────────────────────────► Running
//!              ▲                                   │ abnormal exit,
//!              │ restart(): retry + 1              │ budget left
//!              └───────────────────────────────────┤
//!                                                  │ clean exit, budget spent,
//!                                                  ▼ stop, disconnect
//!                                          retire(): stopped
//! ```
//!
//! Retiring closes the encoder's input and gives it `stop_timeout` to flush
//! queued input and then to exit on its own. Only an encoder still running after
//! that grace period is killed.
//!
//! Retrying and stopped are transitions, not stored phases: the old [`Stream`] is
//! consumed by [`Supervisor::restart`] or [`Supervisor::retire`].
//!
//! Observers never touch room state. The exit watcher and the diagnostic reader
//! post [`Event`]s tagged with the stream's generation; the engine drops events
//! whose generation no longer matches the room's publisher.

use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use super::command::EncoderCommand;
use super::config::EncoderConfig;
use super::diagnostics;
use super::launcher::{EncoderChild, EncoderLauncher, EncoderProcess};
use super::pipe::{EncoderPipe, PipeError};
use crate::engine::Event;
use crate::session::Connection;
use crate::stats::StreamStats;

/// Lifecycle phase of a live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    /// Encoder spawned, no input accepted yet
    Starting,
    /// Encoder has accepted input
    Running,
}

/// A live encoder bound to a room's publisher
#[derive(Debug)]
pub struct Stream {
    stream_id: String,
    owner: Connection,
    stream_kind: Option<String>,
    retry_count: u32,
    generation: u64,
    phase: StreamPhase,
    pid: Option<u32>,
    pipe: EncoderPipe,
    /// Asks the exit watcher to stop the process, carrying the grace period
    terminate: oneshot::Sender<Duration>,
    /// Resolves once the exit watcher has reaped the process
    reaped: oneshot::Receiver<()>,
    started_at: Instant,
    chunks_written: u64,
    bytes_written: u64,
}

impl Stream {
    /// Room this stream publishes for
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Connection authorized to feed and stop this stream
    pub fn owner(&self) -> &Connection {
        &self.owner
    }

    /// Check if `conn` owns this stream
    pub fn is_owned_by(&self, conn: &Connection) -> bool {
        self.owner == *conn
    }

    /// Input format hint passed to the encoder
    pub fn stream_kind(&self) -> Option<&str> {
        self.stream_kind.as_deref()
    }

    /// Consecutive abnormal restarts so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Process-unique id of the current encoder
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// OS process id of the encoder, if known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Time since this encoder was spawned
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Queue a chunk for the encoder
    pub fn write(&mut self, chunk: Bytes) -> Result<(), PipeError> {
        let len = chunk.len() as u64;
        self.pipe.write(chunk)?;

        self.chunks_written += 1;
        self.bytes_written += len;
        if self.phase == StreamPhase::Starting {
            self.phase = StreamPhase::Running;
        }
        Ok(())
    }

    /// Snapshot for the stats endpoint
    pub fn stats(&self, viewers: usize) -> StreamStats {
        StreamStats {
            stream_id: self.stream_id.clone(),
            owner: self.owner.id(),
            phase: self.phase,
            retry_count: self.retry_count,
            pid: self.pid,
            stream_kind: self.stream_kind.clone(),
            viewers,
            chunks_written: self.chunks_written,
            bytes_written: self.bytes_written,
            bytes_buffered: self.pipe.buffered(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// Spawns, observes and retires encoder streams
pub struct Supervisor<L> {
    config: EncoderConfig,
    launcher: L,
    events: mpsc::Sender<Event>,
    next_generation: u64,
    teardowns: JoinSet<()>,
}

impl<L: EncoderLauncher> Supervisor<L> {
    /// Create a supervisor posting observer events to `events`
    pub fn new(config: EncoderConfig, launcher: L, events: mpsc::Sender<Event>) -> Self {
        Self {
            config,
            launcher,
            events,
            next_generation: 1,
            teardowns: JoinSet::new(),
        }
    }

    /// Spawn an encoder for `stream_id` owned by `owner`
    pub fn start(
        &mut self,
        stream_id: &str,
        owner: Connection,
        stream_kind: Option<String>,
        retry_count: u32,
    ) -> io::Result<Stream> {
        let command = EncoderCommand::build(&self.config, stream_id, stream_kind.as_deref());
        let EncoderProcess {
            child,
            stdin,
            stderr,
            pid,
        } = self.launcher.launch(&command)?;

        let generation = self.next_generation;
        self.next_generation += 1;

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let (reaped_tx, reaped_rx) = oneshot::channel();
        tokio::spawn(watch_exit(
            child,
            terminate_rx,
            reaped_tx,
            stream_id.to_string(),
            generation,
            self.events.clone(),
        ));
        diagnostics::spawn_reader(stderr, stream_id.to_string(), generation, self.events.clone());

        let pipe = EncoderPipe::spawn(stdin, self.config.pipe_high_watermark);

        tracing::info!(
            stream = %stream_id,
            conn = owner.id(),
            generation,
            retry = retry_count,
            pid = ?pid,
            destination = %command.destination,
            "Encoder started"
        );

        Ok(Stream {
            stream_id: stream_id.to_string(),
            owner,
            stream_kind,
            retry_count,
            generation,
            phase: StreamPhase::Starting,
            pid,
            pipe,
            terminate: terminate_tx,
            reaped: reaped_rx,
            started_at: Instant::now(),
            chunks_written: 0,
            bytes_written: 0,
        })
    }

    /// Check if an exit with `code` should trigger a restart
    pub fn should_retry(&self, code: Option<i32>, retry_count: u32) -> bool {
        code != Some(0) && retry_count < self.config.max_retries
    }

    /// Spawn the replacement for a stream whose encoder exited abnormally
    ///
    /// The exited process and its pipe are discarded. On failure the old stream is
    /// gone and the caller must close the room.
    pub fn restart(&mut self, stream: Stream) -> io::Result<Stream> {
        let retry_count = stream.retry_count + 1;

        tracing::warn!(
            stream = %stream.stream_id,
            generation = stream.generation,
            retry = retry_count,
            max_retries = self.config.max_retries,
            "Encoder exited abnormally, restarting"
        );

        let Stream {
            stream_id,
            owner,
            stream_kind,
            ..
        } = stream;

        self.start(&stream_id, owner, stream_kind, retry_count)
    }

    /// Tear a stream down: end its input, let the queue drain, then wait for exit
    ///
    /// The teardown completes once the process is reaped, which takes at most
    /// twice `stop_timeout`.
    pub fn retire(&mut self, stream: Stream) {
        let Stream {
            stream_id,
            generation,
            pipe,
            terminate,
            reaped,
            bytes_written,
            ..
        } = stream;
        let stop_timeout = self.config.stop_timeout;

        tracing::info!(stream = %stream_id, generation, bytes_written, "Stopping encoder");

        self.teardowns.spawn(async move {
            match tokio::time::timeout(stop_timeout, pipe.finish()).await {
                Ok(Ok(total)) => {
                    tracing::debug!(stream = %stream_id, generation, total, "Encoder input closed");
                }
                Ok(Err(e)) => {
                    tracing::debug!(stream = %stream_id, generation, error = %e, "Encoder input already broken");
                }
                Err(_) => {
                    tracing::warn!(stream = %stream_id, generation, "Encoder input did not drain in time");
                }
            }
            // Watcher is already gone if the process exited on its own
            let _ = terminate.send(stop_timeout);
            let _ = reaped.await;
        });
    }

    /// Reap finished teardown tasks
    pub fn reap(&mut self) {
        while let Some(result) = self.teardowns.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Teardown task failed");
            }
        }
    }

    /// Number of teardowns still in flight
    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.len()
    }

    /// Wait for every in-flight teardown
    pub async fn drain(&mut self) {
        while let Some(result) = self.teardowns.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Teardown task failed");
            }
        }
    }
}

async fn watch_exit<C: EncoderChild>(
    mut child: C,
    mut terminate: oneshot::Receiver<Duration>,
    reaped: oneshot::Sender<()>,
    stream_id: String,
    generation: u64,
    events: mpsc::Sender<Event>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        request = &mut terminate => {
            // A dropped Stream has no grace period
            let grace = request.unwrap_or(Duration::ZERO);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::warn!(stream = %stream_id, generation, "Encoder did not exit in time, killing");
                    if let Err(e) = child.terminate() {
                        tracing::warn!(stream = %stream_id, generation, error = %e, "Failed to terminate encoder");
                    }
                    child.wait().await
                }
            }
        }
    };

    // Before the event: the engine may be awaiting this teardown while its queue is full
    let _ = reaped.send(());

    let code = match status {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(stream = %stream_id, generation, error = %e, "Failed to wait for encoder");
            None
        }
    };

    tracing::debug!(stream = %stream_id, generation, code = ?code, "Encoder exited");

    let _ = events
        .send(Event::EncoderExited {
            stream_id,
            generation,
            code,
        })
        .await;
}
