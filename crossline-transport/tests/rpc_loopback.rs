//! End-to-end tests of the TCP transport over loopback.
//!
//! A scripted service stands in for the coordinator so these tests only
//! exercise framing, call dispatch and status propagation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossline_core::{
    AckStatus, Acknowledgment, CallContext, DoneReason, PingPongService, RpcStatus, ServerStream,
    TextMessage,
};
use crossline_transport::{RpcClient, RpcError, RpcServer, TransportConfig};
use tokio_util::sync::CancellationToken;

/// Behavior of the scripted service.
#[derive(Clone, Copy)]
enum Script {
    /// Answer triggers immediately; echo every stream message.
    Echo,
    /// Fail every call with `Unavailable`.
    Reject,
    /// Hold triggers until their context ends.
    Stall,
}

struct ScriptedService {
    script: Script,
}

#[async_trait]
impl PingPongService for ScriptedService {
    async fn trigger(&self, ctx: CallContext) -> Result<Acknowledgment, RpcStatus> {
        match self.script {
            Script::Echo => Ok(Acknowledgment {
                status: AckStatus::Sent,
                trigger_id: Some(7),
                reply: None,
            }),
            Script::Reject => Err(RpcStatus::Unavailable("scripted".to_string())),
            Script::Stall => match ctx.done().await {
                DoneReason::DeadlineExceeded => {
                    Err(RpcStatus::DeadlineExceeded("stalled".to_string()))
                }
                DoneReason::Cancelled => Err(RpcStatus::Cancelled),
            },
        }
    }

    async fn ping_pong(&self, stream: ServerStream) -> Result<(), RpcStatus> {
        if let Script::Reject = self.script {
            return Err(RpcStatus::Unavailable("scripted".to_string()));
        }
        let (mut sink, mut source, _ctx) = stream.into_parts();
        while let Some(msg) = source
            .recv()
            .await
            .map_err(|e| RpcStatus::Transport(e.to_string()))?
        {
            sink.send(msg.reply(format!("echo {}", msg.message)))
                .await
                .map_err(|e| RpcStatus::Transport(e.to_string()))?;
        }
        Ok(())
    }
}

async fn start(script: Script) -> (RpcClient, CancellationToken) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let service = Arc::new(ScriptedService { script });
    let server = RpcServer::bind("127.0.0.1:0", service, TransportConfig::local_network())
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let client = RpcClient::new(addr.to_string(), TransportConfig::local_network());
    (client, shutdown)
}

#[tokio::test]
async fn test_trigger_returns_acknowledgment() {
    let (client, shutdown) = start(Script::Echo).await;

    let ack = client.trigger().await.expect("trigger");
    assert_eq!(ack.status, AckStatus::Sent);
    assert_eq!(ack.trigger_id, Some(7));

    shutdown.cancel();
}

#[tokio::test]
async fn test_trigger_failure_status_reaches_client() {
    let (client, shutdown) = start(Script::Reject).await;

    let err = client.trigger().await.expect_err("rejected");
    assert_eq!(
        err,
        RpcError::Status(RpcStatus::Unavailable("scripted".to_string()))
    );

    shutdown.cancel();
}

#[tokio::test]
async fn test_trigger_deadline_travels_to_server() {
    let (client, shutdown) = start(Script::Stall).await;

    let err = client
        .trigger_with_timeout(Some(Duration::from_millis(50)))
        .await
        .expect_err("stalled");
    assert_eq!(
        err,
        RpcError::Status(RpcStatus::DeadlineExceeded("stalled".to_string()))
    );

    shutdown.cancel();
}

#[tokio::test]
async fn test_ping_pong_echo_and_clean_close() {
    let (client, shutdown) = start(Script::Echo).await;

    let mut stream = client.ping_pong().await.expect("open stream");
    stream
        .send(TextMessage::new("hello").with_correlation_id(3))
        .await
        .expect("send");
    let reply = stream.recv().await.expect("recv").expect("message");
    assert_eq!(reply.message, "echo hello");
    assert_eq!(reply.correlation_id, Some(3));

    stream.close_send().await.expect("close");
    assert_eq!(stream.recv().await.expect("final status"), None);
    assert_eq!(stream.recv().await.expect("after end"), None);

    shutdown.cancel();
}

#[tokio::test]
async fn test_ping_pong_failure_status_reaches_client() {
    let (client, shutdown) = start(Script::Reject).await;

    let mut stream = client.ping_pong().await.expect("open stream");
    let err = stream.recv().await.expect_err("rejected");
    assert_eq!(
        err,
        RpcError::Status(RpcStatus::Unavailable("scripted".to_string()))
    );

    shutdown.cancel();
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let client = RpcClient::new(addr.to_string(), TransportConfig::local_network());
    let err = client.trigger().await.expect_err("nobody listening");
    assert!(matches!(err, RpcError::Connect(_)), "got {err:?}");
}

#[tokio::test]
async fn test_silent_server_hits_local_deadline() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    // Accept and hold connections without ever answering.
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config =
        TransportConfig::local_network().with_call_timeout(Some(Duration::from_millis(200)));
    let client = RpcClient::new(addr.to_string(), config);
    let err = tokio::time::timeout(Duration::from_secs(3), client.trigger())
        .await
        .expect("client gives up on its own")
        .expect_err("no answer");
    assert_eq!(err, RpcError::DeadlineExceeded);

    silent.abort();
}

#[tokio::test]
async fn test_server_drops_connection_without_call_frame() {
    use tokio::io::AsyncReadExt;

    let service = Arc::new(ScriptedService {
        script: Script::Echo,
    });
    let config =
        TransportConfig::local_network().with_handshake_timeout(Duration::from_millis(100));
    let server = RpcServer::bind("127.0.0.1:0", service, config)
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    tokio::spawn(server.serve(shutdown.clone()));

    let mut idle = tokio::net::TcpStream::connect(addr).await.expect("connect");
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(3), idle.read(&mut buf))
        .await
        .expect("server closes the idle connection");
    assert_eq!(read.expect("clean close"), 0);

    shutdown.cancel();
}
