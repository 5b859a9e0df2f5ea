//! Client-side error types.

use crossline_core::{RpcStatus, TransportError};

use crate::wire::WireError;

/// Errors surfaced by [`RpcClient`](crate::RpcClient) calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Could not reach the server.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Connecting took longer than the configured timeout.
    #[error("connect timed out")]
    ConnectTimeout,

    /// The call's deadline passed without an answer from the server.
    #[error("call deadline exceeded")]
    DeadlineExceeded,

    /// The server answered with a failure status.
    #[error("server returned status: {0}")]
    Status(#[from] RpcStatus),

    /// The connection failed underneath the call.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server sent bytes that are not a valid frame.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A valid frame arrived where it makes no sense.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// The server closed the connection before answering.
    #[error("connection closed before a response")]
    ConnectionClosed,
}
