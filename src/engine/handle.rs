//! Cloneable front end to a running engine

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::EngineConfig;
use super::event::Event;
use super::machine::Engine;
use crate::encoder::EncoderLauncher;
use crate::error::{Error, Result};
use crate::session::Connection;
use crate::stats::ServerStats;

/// Handle for posting events to the engine task
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Event>,
}

impl EngineHandle {
    /// Spawn an engine on the current runtime
    pub fn spawn<L: EncoderLauncher>(config: EngineConfig, launcher: L) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.event_capacity);
        let engine = Engine::new(config, launcher, tx.clone());
        let task = tokio::spawn(engine.run(rx));

        (Self { tx }, task)
    }

    async fn post(&self, event: Event) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::EngineClosed)
    }

    /// Report a new connection
    pub async fn opened(&self, conn: Connection) -> Result<()> {
        self.post(Event::Opened { conn }).await
    }

    /// Forward an inbound frame
    ///
    /// Waits while the event queue is full.
    pub async fn message(&self, conn: Connection, payload: Bytes) -> Result<()> {
        self.post(Event::Message { conn, payload }).await
    }

    /// Report a closed connection
    pub async fn closed(&self, conn: Connection) -> Result<()> {
        self.post(Event::Closed { conn }).await
    }

    /// Fetch a statistics snapshot
    pub async fn stats(&self) -> Result<ServerStats> {
        let (reply, rx) = oneshot::channel();
        self.post(Event::Stats { reply }).await?;
        rx.await.map_err(|_| Error::EngineClosed)
    }

    /// Close every stream and stop the engine
    ///
    /// Resolves once all encoders have been torn down.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.post(Event::Shutdown { done }).await?;
        rx.await.map_err(|_| Error::EngineClosed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use std::time::Duration;

    use super::*;
    use crate::encoder::launcher::fake::FakeLauncher;
    use crate::encoder::EncoderConfig;

    fn config() -> EngineConfig {
        EngineConfig::default().encoder(EncoderConfig::default().stop_timeout(Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let launcher = FakeLauncher::default();
        let (handle, task) = EngineHandle::spawn(config(), launcher.clone());
        let (conn, mut rx) = Connection::new(1, None, 8);

        handle.opened(conn.clone()).await.unwrap();
        let start = json!({"type": "start-stream", "streamId": "room1"}).to_string();
        handle.message(conn.clone(), Bytes::from(start)).await.unwrap();

        let reply: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply, json!({"type": "stream-started", "streamId": "room1"}));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.active_streams, 1);
        assert_eq!(stats.active_connections, 1);
        assert_eq!(launcher.launch_count(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.stats().await, Err(Error::EngineClosed)));
    }

    #[tokio::test]
    async fn test_disconnect_through_handle() {
        let launcher = FakeLauncher::default();
        let (handle, _task) = EngineHandle::spawn(config(), launcher.clone());
        let (conn, _rx) = Connection::new(1, None, 8);

        handle.opened(conn.clone()).await.unwrap();
        let start = json!({"type": "start-stream", "streamId": "room1"}).to_string();
        handle.message(conn.clone(), Bytes::from(start)).await.unwrap();
        handle.closed(conn).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.rooms, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.streams_closed, 1);
    }
}
