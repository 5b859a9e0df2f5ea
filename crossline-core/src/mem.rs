//! In-memory bidirectional streams.
//!
//! [`duplex`] returns the server side as a regular [`ServerStream`] and the
//! remote side as a [`MemPeer`] that tests (or an embedding process) drive
//! directly. No serialization happens; messages move through bounded tokio
//! channels.
//!
//! ```ignore
//! let (stream, mut peer) = mem::duplex(8);
//! tokio::spawn(async move { service.ping_pong(stream).await });
//! let ping = peer.recv().await.expect("ping");
//! peer.send(ping.reply("pong")).await?;
//! peer.close_send(); // clean end of stream
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{CallContext, ServerStream, StreamSink, StreamSource, TextMessage, TransportError};

type Inbound = Result<TextMessage, TransportError>;

/// Create a connected pair. `capacity` bounds each direction.
pub fn duplex(capacity: usize) -> (ServerStream, MemPeer) {
    let capacity = capacity.max(1);
    let (to_peer_tx, to_peer_rx) = mpsc::channel(capacity);
    let (to_server_tx, to_server_rx) = mpsc::channel(capacity);
    let context = CallContext::new();

    let stream = ServerStream::new(
        Box::new(MemSink { tx: to_peer_tx }),
        Box::new(MemSource { rx: to_server_rx }),
        context.clone(),
    )
    .with_peer("mem");

    let peer = MemPeer {
        tx: Some(to_server_tx),
        rx: to_peer_rx,
        context,
    };
    (stream, peer)
}

struct MemSink {
    tx: mpsc::Sender<TextMessage>,
}

#[async_trait]
impl StreamSink for MemSink {
    async fn send(&mut self, msg: TextMessage) -> Result<(), TransportError> {
        self.tx.send(msg).await.map_err(|_| TransportError::Closed)
    }
}

struct MemSource {
    rx: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl StreamSource for MemSource {
    async fn recv(&mut self) -> Result<Option<TextMessage>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Remote end of an in-memory stream.
pub struct MemPeer {
    tx: Option<mpsc::Sender<Inbound>>,
    rx: mpsc::Receiver<TextMessage>,
    context: CallContext,
}

impl MemPeer {
    /// Send a message to the server side.
    ///
    /// # Errors
    ///
    /// `TransportError::Closed` after [`close_send`](Self::close_send) or when
    /// the server dropped its receive half.
    pub async fn send(&mut self, msg: TextMessage) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx.send(Ok(msg)).await.map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// Next message pushed by the server; `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<TextMessage> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<TextMessage> {
        self.rx.try_recv().ok()
    }

    /// Close the sending direction gracefully; the server sees a clean end.
    pub fn close_send(&mut self) {
        self.tx = None;
    }

    /// Terminate the sending direction with a transport error.
    pub async fn fail(&mut self, error: TransportError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error)).await;
        }
    }

    /// Cancel the server's call context, as a transport teardown would.
    pub fn abort(&self) {
        self.context.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_flow_both_ways() {
        let (stream, mut peer) = duplex(4);
        let (mut sink, mut source, _ctx) = stream.into_parts();

        sink.send(TextMessage::new("ping")).await.expect("send");
        assert_eq!(peer.recv().await, Some(TextMessage::new("ping")));

        peer.send(TextMessage::new("pong")).await.expect("send");
        assert_eq!(
            source.recv().await.expect("recv"),
            Some(TextMessage::new("pong"))
        );
    }

    #[tokio::test]
    async fn test_close_send_is_clean_end() {
        let (stream, mut peer) = duplex(1);
        let (_sink, mut source, _ctx) = stream.into_parts();
        peer.close_send();
        assert_eq!(source.recv().await.expect("recv"), None);
        assert_eq!(
            peer.send(TextMessage::new("late")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_fail_surfaces_error() {
        let (stream, mut peer) = duplex(1);
        let (_sink, mut source, _ctx) = stream.into_parts();
        peer.fail(TransportError::Reset("boom".to_string())).await;
        assert_eq!(
            source.recv().await,
            Err(TransportError::Reset("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_abort_cancels_server_context() {
        let (stream, peer) = duplex(1);
        peer.abort();
        assert!(stream.context().is_done());
    }

    #[tokio::test]
    async fn test_send_fails_when_peer_dropped() {
        let (stream, peer) = duplex(1);
        drop(peer);
        let (mut sink, _source, _ctx) = stream.into_parts();
        assert_eq!(
            sink.send(TextMessage::new("x")).await,
            Err(TransportError::Closed)
        );
    }
}
