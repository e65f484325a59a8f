//! Embedded ingest server relaying to a custom RTMP origin
//!
//! Run with: cargo run --example custom_origin [ORIGIN] [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example custom_origin                                  # rtmp://localhost, 0.0.0.0:5000
//!   cargo run --example custom_origin rtmp://origin.example            # custom origin
//!   cargo run --example custom_origin rtmp://origin.example 127.0.0.1:8080
//!
//! ## Publishing
//!
//! Open a WebSocket to ws://localhost:5000/stream and send:
//!   {"type":"start-stream","streamId":"test","streamKind":"webm"}
//!   {"type":"video-chunk","streamId":"test","chunk":[26,69,223,163]}
//!   {"type":"stop-stream","streamId":"test"}
//!
//! The encoder publishes to <ORIGIN>/live/test.
//!
//! ## Watching
//!
//! Other sockets send {"type":"join-stream","streamId":"test"} to receive status
//! and encoder diagnostics. Live counters are served at http://localhost:5000/stats.

use std::net::SocketAddr;
use std::time::Duration;

use ingest_rs::{EncoderConfig, EngineConfig, IngestServer, ServerConfig};

fn print_usage() {
    eprintln!("Usage: custom_origin [ORIGIN] [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  ORIGIN       RTMP origin base (default: rtmp://localhost)");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:5000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let origin = args.get(1).map(String::as_str).unwrap_or("rtmp://localhost");
    let bind_addr: SocketAddr = match args.get(2) {
        Some(addr) => match addr.replace("localhost", "127.0.0.1").parse() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: invalid bind address '{addr}': {e}");
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:5000".parse()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ingest_rs=debug".parse()?)
                .add_directive("custom_origin=debug".parse()?),
        )
        .init();

    // Fewer restarts and a short stop grace than the binary defaults
    let encoder = EncoderConfig::default()
        .origin_base(origin)
        .max_retries(2)
        .stop_timeout(Duration::from_secs(2));
    let config = ServerConfig::with_addr(bind_addr).engine(EngineConfig::default().encoder(encoder));

    let server = IngestServer::new(config);
    println!(
        "Relaying ws://{}/stream to {}/live/<streamId>",
        server.config().bind_addr,
        server.config().engine.encoder.origin_base
    );

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
