//! The full exchange over loopback TCP: a real server running the
//! coordinator, a client stream answering pings, and trigger calls.

use std::sync::Arc;
use std::time::Duration;

use crossline::responder::answer_pings;
use crossline::transport::{RpcClient, RpcServer, TransportConfig};
use crossline::{AckStatus, Coordinator, CoordinatorConfig};
use tokio_util::sync::CancellationToken;

async fn start_server(
    config: CoordinatorConfig,
) -> (Arc<Coordinator>, RpcClient, CancellationToken) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let coordinator = Arc::new(Coordinator::new(config));
    let server = RpcServer::bind(
        "127.0.0.1:0",
        Arc::clone(&coordinator),
        TransportConfig::local_network(),
    )
    .await
    .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let client = RpcClient::new(addr.to_string(), TransportConfig::local_network());
    (coordinator, client, shutdown)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_trigger_without_stream_over_tcp() {
    let (_coordinator, client, shutdown) = start_server(CoordinatorConfig::default()).await;

    let ack = client.trigger().await.expect("trigger");
    assert_eq!(ack.status, AckStatus::NoActiveStream);
    assert_eq!(ack.trigger_id, None);

    shutdown.cancel();
}

#[tokio::test]
async fn test_trigger_returns_client_pong() {
    let (coordinator, client, shutdown) = start_server(CoordinatorConfig::default()).await;

    let stream = client.ping_pong().await.expect("open stream");
    let stop = CancellationToken::new();
    let responder = tokio::spawn(answer_pings(
        stream,
        Duration::from_millis(10),
        stop.clone(),
    ));
    wait_until(|| coordinator.registry().is_active()).await;

    let ack = client.trigger().await.expect("trigger");
    assert_eq!(ack.status, AckStatus::Replied);
    assert!(ack.trigger_id.is_some());
    let reply = ack.reply.expect("pong text");
    assert!(reply.starts_with("pong "), "got {reply}");

    stop.cancel();
    let answered = responder.await.expect("join").expect("responder");
    assert_eq!(answered, 1);

    wait_until(|| !coordinator.registry().is_active()).await;
    let ack = client.trigger().await.expect("trigger");
    assert_eq!(ack.status, AckStatus::NoActiveStream);

    shutdown.cancel();
}

#[tokio::test]
async fn test_fire_and_forget_over_tcp() {
    let (coordinator, client, shutdown) =
        start_server(CoordinatorConfig::fire_and_forget()).await;

    let mut stream = client.ping_pong().await.expect("open stream");
    wait_until(|| coordinator.registry().is_active()).await;

    let ack = client.trigger().await.expect("trigger");
    assert_eq!(ack.status, AckStatus::Sent);

    let ping = stream.recv().await.expect("recv").expect("ping");
    assert_eq!(ping.correlation_id, ack.trigger_id);

    stream.close_send().await.expect("close");
    assert_eq!(stream.recv().await.expect("final status"), None);

    shutdown.cancel();
}

#[tokio::test]
async fn test_server_shutdown_ends_open_stream() {
    let (coordinator, client, shutdown) = start_server(CoordinatorConfig::default()).await;

    let mut stream = client.ping_pong().await.expect("open stream");
    wait_until(|| coordinator.registry().is_active()).await;

    shutdown.cancel();
    let end = tokio::time::timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("stream ends after shutdown");
    assert_eq!(end.expect("clean end"), None);
    wait_until(|| !coordinator.registry().is_active()).await;
}
