//! The RPC surface served by a transport.
//!
//! | Method      | Shape                              |
//! |-------------|------------------------------------|
//! | `trigger`   | unary, no request fields → [`Acknowledgment`] |
//! | `ping_pong` | bidirectional stream of [`TextMessage`](crate::TextMessage) |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Acknowledgment, CallContext, ServerStream};

/// Status returned to a remote caller when an RPC does not succeed.
///
/// Serializable so transports can ship it to the client as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcStatus {
    /// The call could not complete before its deadline.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The resource the call needed went away.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The caller cancelled the call.
    #[error("cancelled")]
    Cancelled,

    /// The stream failed underneath the handler.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The method is not served.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

/// Handlers behind the two RPC methods.
#[async_trait]
pub trait PingPongService: Send + Sync + 'static {
    /// Unary call asking for a push on the currently open stream.
    async fn trigger(&self, ctx: CallContext) -> Result<Acknowledgment, RpcStatus>;

    /// Long-lived bidirectional stream; returns when the stream ends.
    async fn ping_pong(&self, stream: ServerStream) -> Result<(), RpcStatus>;
}
