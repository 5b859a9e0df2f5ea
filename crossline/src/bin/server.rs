//! crossline server: serves `trigger` and `ping_pong` over TCP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin crossline-server -- --listen 127.0.0.1:50006
//! cargo run --bin crossline-server -- --correlation tagged --reply-timeout-ms 2000
//! ```
//!
//! Stops on Ctrl-C; every open stream is cancelled on the way out.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossline::transport::{RpcServer, TransportConfig};
use crossline::{Coordinator, CoordinatorConfig, CorrelationMode};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "crossline-server")]
#[command(about = "Push pings into a ping-pong stream on every trigger call", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:50006")]
    listen: String,

    /// How long a trigger waits for the client's pong
    #[arg(long, default_value_t = 5000)]
    reply_timeout_ms: u64,

    /// Upper bound on handing a push to the stream
    #[arg(long, default_value_t = 5000)]
    enqueue_timeout_ms: u64,

    /// How pongs are matched to triggers: arrival or tagged
    #[arg(long, default_value = "arrival")]
    correlation: CorrelationMode,

    /// Return from trigger as soon as the push is queued
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crossline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = CoordinatorConfig::default()
        .with_reply_timeout(Duration::from_millis(args.reply_timeout_ms))
        .with_enqueue_timeout(Duration::from_millis(args.enqueue_timeout_ms))
        .with_correlation(args.correlation)
        .with_await_reply(!args.no_wait);
    tracing::info!(?config, "starting coordinator");

    let coordinator = Arc::new(Coordinator::new(config));
    let server = RpcServer::bind(
        args.listen.as_str(),
        Arc::clone(&coordinator),
        TransportConfig::default(),
    )
    .await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received");
            }
            shutdown.cancel();
        }
    });

    server.serve(shutdown).await?;

    let stats = coordinator.stats();
    tracing::info!(?stats, "server stopped");
    Ok(())
}
