//! WebSocket ingest listener
//!
//! Serves the HTTP routes and runs one reader task and one writer task per
//! WebSocket connection. Readers forward frames to the engine; writers drain the
//! connection's outbound queue into the socket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::encoder::{EncoderLauncher, ProcessLauncher};
use crate::engine::EngineHandle;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::session::Connection;

/// WebSocket ingest server
pub struct IngestServer<L: EncoderLauncher = ProcessLauncher> {
    config: ServerConfig,
    launcher: L,
}

impl IngestServer<ProcessLauncher> {
    /// Create a server that spawns encoders as subprocesses
    pub fn new(config: ServerConfig) -> Self {
        Self::with_launcher(config, ProcessLauncher)
    }
}

impl<L: EncoderLauncher> IngestServer<L> {
    /// Create a server with a custom encoder launcher
    pub fn with_launcher(config: ServerConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until the process is killed
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and run until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Run on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the listener stops accepting, every active stream is closed and
    /// all encoder teardowns are awaited before this returns.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let (handle, engine_task) = EngineHandle::spawn(self.config.engine.clone(), self.launcher);

        let state = AppState::new(&self.config, handle.clone());
        let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(
            addr = %addr,
            origin = %self.config.engine.encoder.origin_base,
            encoder = %self.config.engine.encoder.program,
            "Ingest server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        if let Err(e) = handle.shutdown().await {
            tracing::warn!(error = %e, "Engine already stopped");
        }
        if let Err(e) = engine_task.await {
            tracing::error!(error = %e, "Engine task failed");
        }

        tracing::info!("Ingest server stopped");
        served?;
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    handle: EngineHandle,
    next_conn_id: Arc<AtomicU64>,
    connection_semaphore: Option<Arc<Semaphore>>,
    max_message_size: usize,
    outbound_queue: usize,
}

impl AppState {
    fn new(config: &ServerConfig, handle: EngineHandle) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            handle,
            next_conn_id: Arc::new(AtomicU64::new(1)),
            connection_semaphore,
            max_message_size: config.max_message_size,
            outbound_queue: config.outbound_queue,
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stats", get(stats))
        .route("/stream", get(upgrade))
        .with_state(state)
}

async fn index() -> &'static str {
    "Server is running"
}

async fn stats(State(state): State<AppState>) -> Response {
    match state.handle.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    // Check connection limit
    let permit = match &state.connection_semaphore {
        Some(sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, peer_addr, permit))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    peer_addr: SocketAddr,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (conn, mut outbound) = Connection::new(id, Some(peer_addr), state.outbound_queue);
    let (mut sink, mut frames) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(conn = id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    if state.handle.opened(conn.clone()).await.is_err() {
        writer.abort();
        return;
    }

    while let Some(frame) = frames.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by the socket itself
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(conn = id, error = %e, "WebSocket read failed");
                break;
            }
        };

        if state.handle.message(conn.clone(), payload).await.is_err() {
            break;
        }
    }

    let _ = state.handle.closed(conn).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::encoder::launcher::fake::FakeLauncher;

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn start_server() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = IngestServer::with_launcher(ServerConfig::default(), FakeLauncher::default());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(listener, async move {
            let _ = stop_rx.await;
        }));

        (addr, stop_tx, task)
    }

    #[tokio::test]
    async fn test_health_route() {
        let (addr, stop, task) = start_server().await;

        let response = http_get(addr, "/").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("Server is running"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stats_route() {
        let (addr, stop, task) = start_server().await;

        let response = http_get(addr, "/stats").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"activeStreams\":0"));
        assert!(response.contains("\"rooms\":0"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stream_route_requires_upgrade() {
        let (addr, stop, task) = start_server().await;

        let response = http_get(addr, "/stream").await;
        assert!(!response.starts_with("HTTP/1.1 200"));
        assert!(!response.starts_with("HTTP/1.1 404"));

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
