//! TCP server for a [`PingPongService`].
//!
//! Every call gets its own connection. The first frame names the method:
//!
//! ```text
//! trigger:    client ── Call{trigger} ──►  server ── Ack | Status{error} ──► close
//! ping_pong:  client ── Call{ping_pong} ──► server
//!             client ◄── Message ... Message ──► server
//!             client ── End / EOF ──►           server ── Status ──► close
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crossline_core::{CallContext, PingPongService, RpcStatus, ServerStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::connection::{FrameReader, FrameWriter, TcpSink, TcpSource};
use crate::wire::{Frame, Method};
use crate::TransportConfig;

/// Accepts connections and dispatches calls to a service.
pub struct RpcServer<S> {
    listener: TcpListener,
    service: Arc<S>,
    config: TransportConfig,
}

impl<S: PingPongService> RpcServer<S> {
    /// Bind a listener on `addr`.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        service: Arc<S>,
        config: TransportConfig,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service,
            config,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Cancelling `shutdown` also cancels the context of every call in
    /// flight.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        tracing::info!(addr = %self.listener.local_addr()?, "rpc server listening");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("rpc server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            Arc::clone(&self.service),
                            self.config.clone(),
                            shutdown.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }
    }
}

async fn handle_connection<S: PingPongService>(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<S>,
    config: TransportConfig,
    token: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, config.read_chunk);
    let mut writer = FrameWriter::new(write_half);

    let first = tokio::select! {
        _ = token.cancelled() => return,
        first = tokio::time::timeout(config.handshake_timeout, reader.read_frame()) => {
            match first {
                Ok(first) => first,
                Err(_) => {
                    tracing::debug!(%peer, timeout = ?config.handshake_timeout, "no call frame in time");
                    return;
                }
            }
        }
    };

    match first {
        Ok(Some(Frame::Call { method, timeout_ms })) => {
            let mut ctx = CallContext::from_token(token);
            if let Some(ms) = timeout_ms {
                ctx = ctx.with_timeout(Duration::from_millis(ms));
            }
            tracing::debug!(%peer, ?method, ?timeout_ms, "call received");
            match method {
                Method::Trigger => serve_trigger(&*service, ctx, reader, writer).await,
                Method::PingPong => serve_ping_pong(&*service, ctx, peer, reader, writer).await,
            }
        }
        Ok(Some(other)) => {
            tracing::warn!(%peer, frame = ?other, "connection did not open with a call");
            let status = RpcStatus::Unimplemented(String::from("expected a call frame"));
            finish(&mut writer, Some(status)).await;
        }
        Ok(None) => tracing::debug!(%peer, "connection closed before a call"),
        Err(e) => tracing::warn!(%peer, error = %e, "failed to read call frame"),
    }
}

async fn serve_trigger<S: PingPongService>(
    service: &S,
    ctx: CallContext,
    mut reader: FrameReader<OwnedReadHalf>,
    mut writer: FrameWriter<OwnedWriteHalf>,
) {
    let call = service.trigger(ctx.clone());
    tokio::pin!(call);

    // Anything the client does after the call frame means it is gone.
    let result = tokio::select! {
        result = &mut call => result,
        _ = reader.read_frame() => {
            tracing::debug!("trigger caller went away");
            ctx.cancel();
            call.await
        }
    };

    let frame = match result {
        Ok(ack) => Frame::Ack(ack),
        Err(status) => Frame::Status {
            error: Some(status),
        },
    };
    if let Err(e) = writer.write_frame(&frame).await {
        tracing::debug!(error = %e, "could not deliver trigger response");
    }
    let _ = writer.shutdown().await;
}

async fn serve_ping_pong<S: PingPongService>(
    service: &S,
    ctx: CallContext,
    peer: SocketAddr,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
) {
    let writer = Arc::new(Mutex::new(writer));
    let stream = ServerStream::new(
        Box::new(TcpSink::new(Arc::clone(&writer))),
        Box::new(TcpSource::new(reader)),
        ctx.clone(),
    )
    .with_peer(peer.to_string());

    let result = service.ping_pong(stream).await;
    ctx.cancel();
    if let Err(status) = &result {
        tracing::debug!(%peer, %status, "ping-pong call failed");
    }

    let mut writer = writer.lock().await;
    finish(&mut writer, result.err()).await;
}

async fn finish(writer: &mut FrameWriter<OwnedWriteHalf>, error: Option<RpcStatus>) {
    if let Err(e) = writer.write_frame(&Frame::Status { error }).await {
        tracing::debug!(error = %e, "could not deliver final status");
    }
    let _ = writer.shutdown().await;
}
