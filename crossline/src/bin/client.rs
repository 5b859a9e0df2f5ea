//! crossline client: keeps a ping-pong stream open and answers every ping.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin crossline-client -- --addr 127.0.0.1:50006
//! ```
//!
//! After the stream is up, fires `--triggers` trigger calls (one by default)
//! so the server has something to push. Exits when the server ends the
//! stream, or closes it on Ctrl-C.

use std::time::Duration;

use clap::Parser;
use crossline::responder::answer_pings;
use crossline::transport::{RpcClient, TransportConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "crossline-client")]
#[command(about = "Answer server pings on a ping-pong stream", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:50006")]
    addr: String,

    /// Delay before answering each ping
    #[arg(long, default_value_t = 1000)]
    reply_delay_ms: u64,

    /// Trigger calls to fire once the stream is open
    #[arg(long, default_value_t = 1)]
    triggers: usize,

    /// Pause between opening the stream and the first trigger
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,
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

    let client = RpcClient::new(args.addr.clone(), TransportConfig::default());
    let stream = client.ping_pong().await?;
    tracing::info!(addr = %client.addr(), "ping-pong stream open");

    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received");
                stop.cancel();
            }
        }
    });

    tokio::spawn({
        let client = client.clone();
        let settle = Duration::from_millis(args.settle_ms);
        let count = args.triggers;
        async move {
            tokio::time::sleep(settle).await;
            for n in 1..=count {
                match client.trigger().await {
                    Ok(ack) => tracing::info!(n, ?ack, "trigger acknowledged"),
                    Err(e) => tracing::warn!(n, error = %e, "trigger failed"),
                }
            }
        }
    });

    let answered = answer_pings(stream, Duration::from_millis(args.reply_delay_ms), stop).await?;
    tracing::info!(answered, "client done");
    Ok(())
}
