//! Bidirectional stream abstraction consumed by the coordinator.
//!
//! A transport hands the server one [`ServerStream`] per ping-pong call: a
//! send half, a receive half and the call's [`CallContext`]. The halves are
//! separate objects so the receive side can live in its own task while the
//! send side stays with the loop that owns the stream.

use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::{CallContext, TextMessage};

/// Failure of a stream operation other than a clean close.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The other side is gone; nothing more can be sent.
    #[error("stream closed")]
    Closed,

    /// The connection was torn down abruptly.
    #[error("connection reset: {0}")]
    Reset(String),

    /// The peer sent something that does not fit the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::Reset(error.to_string()),
            _ => TransportError::Io(error.to_string()),
        }
    }
}

/// Send half of a bidirectional stream.
#[async_trait]
pub trait StreamSink: Send {
    /// Send one message to the peer.
    async fn send(&mut self, msg: TextMessage) -> Result<(), TransportError>;
}

/// Receive half of a bidirectional stream.
#[async_trait]
pub trait StreamSource: Send {
    /// Receive the next message.
    ///
    /// `Ok(None)` is the clean end of the stream: the peer closed its side
    /// gracefully. Any other termination is an `Err`.
    async fn recv(&mut self) -> Result<Option<TextMessage>, TransportError>;
}

/// Server side of one ping-pong call.
pub struct ServerStream {
    sink: Box<dyn StreamSink>,
    source: Box<dyn StreamSource>,
    context: CallContext,
    peer: String,
}

impl ServerStream {
    /// Bundle the two halves with the call context.
    pub fn new(
        sink: Box<dyn StreamSink>,
        source: Box<dyn StreamSource>,
        context: CallContext,
    ) -> Self {
        Self {
            sink,
            source,
            context,
            peer: String::from("unknown"),
        }
    }

    /// Record the remote address, for logs.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// The call context; cancelled when the transport tears the call down.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Remote address as reported by the transport.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Split into send half, receive half and context.
    pub fn into_parts(self) -> (Box<dyn StreamSink>, Box<dyn StreamSource>, CallContext) {
        (self.sink, self.source, self.context)
    }
}

impl std::fmt::Debug for ServerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStream")
            .field("peer", &self.peer)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
