//! Ingest server binary
//!
//! # Usage
//!
//! ```bash
//! # Listen on :5000 and relay to rtmp://localhost/live/<streamId>
//! ingest-server
//!
//! # Custom origin and encoder binary
//! RTMP_SERVER=rtmp://origin.example FFMPEG_PATH=/usr/local/bin/ffmpeg ingest-server --port 8080
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ingest_rs::encoder::config::{DEFAULT_MAX_RETRIES, DEFAULT_ORIGIN_BASE};
use ingest_rs::server::config::DEFAULT_PORT;
use ingest_rs::{EncoderConfig, EngineConfig, IngestServer, ServerConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// WebSocket ingest server relaying live streams to an RTMP origin
#[derive(Parser, Debug)]
#[command(name = "ingest-server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// RTMP origin base; streams go to <base>/live/<streamId>
    #[arg(long, env = "RTMP_SERVER", default_value = DEFAULT_ORIGIN_BASE)]
    rtmp_server: String,

    /// Encoder executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg_path: String,

    /// Restarts allowed after abnormal encoder exits
    #[arg(long, env = "MAX_ENCODER_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_encoder_retries: u32,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Seconds an encoder gets to drain its input, then to exit, before it is killed
    #[arg(long, default_value_t = 5)]
    stop_timeout: u64,

    /// Log filter (trace, debug, info, warn, error or a full directive)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        let layer = match self.log_format {
            LogFormat::Text => fmt::layer().boxed(),
            LogFormat::Json => fmt::layer().json().boxed(),
        };

        tracing_subscriber::registry().with(layer).with(filter).init();
    }

    fn server_config(&self) -> ServerConfig {
        let encoder = EncoderConfig::default()
            .program(&self.ffmpeg_path)
            .origin_base(&self.rtmp_server)
            .max_retries(self.max_encoder_retries)
            .stop_timeout(Duration::from_secs(self.stop_timeout));

        ServerConfig::default()
            .port(self.port)
            .max_connections(self.max_connections)
            .engine(EngineConfig::default().encoder(encoder))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Ingest server starting");

    IngestServer::new(args.server_config())
        .run_until(shutdown_signal())
        .await
        .context("server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
