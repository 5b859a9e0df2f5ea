//! crossline flow: a scripted run of the whole two-way exchange.
//!
//! 1. Open a ping-pong stream and answer pings in the background.
//! 2. Call `trigger`, which pushes a ping into that stream.
//! 3. The pong travels back and `trigger` returns it.
//!
//! ```bash
//! cargo run --bin crossline-server &
//! cargo run --bin crossline-flow
//! ```

use std::time::Duration;

use clap::Parser;
use crossline::responder::answer_pings;
use crossline::transport::{RpcClient, TransportConfig};
use crossline::AckStatus;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "crossline-flow")]
#[command(about = "Scripted trigger / ping / pong round trip", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:50006")]
    addr: String,

    /// Delay before answering each ping
    #[arg(long, default_value_t = 1000)]
    reply_delay_ms: u64,

    /// Pause between opening the stream and calling trigger
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,

    /// Deadline for the trigger call
    #[arg(long, default_value_t = 15_000)]
    trigger_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    println!("=== two-way flow ===");
    println!("1. trigger pushes a ping into the open ping-pong stream");
    println!("2. the stream delivers the ping to this client");
    println!("3. the client's pong travels back to the trigger call");
    println!();

    let client = RpcClient::new(args.addr.clone(), TransportConfig::default());

    println!("opening ping-pong stream to {}", client.addr());
    let stream = client.ping_pong().await?;
    let stop = CancellationToken::new();
    let responder = tokio::spawn(answer_pings(
        stream,
        Duration::from_millis(args.reply_delay_ms),
        stop.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;

    println!("calling trigger");
    let ack = client
        .trigger_with_timeout(Some(Duration::from_millis(args.trigger_timeout_ms)))
        .await?;
    match (ack.status, ack.reply.as_deref()) {
        (AckStatus::Replied, Some(reply)) => {
            println!("trigger {:?} answered: {reply}", ack.trigger_id);
        }
        (status, _) => println!("trigger {:?} finished as {status:?}", ack.trigger_id),
    }

    stop.cancel();
    let answered = responder.await??;
    println!("stream closed after {answered} pong(s)");
    println!("=== done ===");
    Ok(())
}
