//! Error types for the coordination layer.

use crossline_core::{RpcStatus, TransportError};

/// Errors surfaced by triggers and stream loops.
///
/// "No active stream" and "no reply in time" are not here: both are
/// successful trigger outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The push could not be handed to the stream loop before the deadline.
    #[error("trigger could not be queued before its deadline")]
    EnqueueTimeout,

    /// The stream loop went away before accepting the push.
    #[error("stream closed before the trigger was queued")]
    StreamClosed,

    /// The caller cancelled the trigger.
    #[error("trigger cancelled by caller")]
    Cancelled,

    /// Sending to or receiving from the peer failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<CoordinatorError> for RpcStatus {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::EnqueueTimeout => RpcStatus::DeadlineExceeded(err.to_string()),
            CoordinatorError::StreamClosed => RpcStatus::Unavailable(err.to_string()),
            CoordinatorError::Cancelled => RpcStatus::Cancelled,
            CoordinatorError::Transport(e) => RpcStatus::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_status_mapping() {
        assert!(matches!(
            RpcStatus::from(CoordinatorError::EnqueueTimeout),
            RpcStatus::DeadlineExceeded(_)
        ));
        assert!(matches!(
            RpcStatus::from(CoordinatorError::StreamClosed),
            RpcStatus::Unavailable(_)
        ));
        assert_eq!(
            RpcStatus::from(CoordinatorError::Cancelled),
            RpcStatus::Cancelled
        );
        assert_eq!(
            RpcStatus::from(CoordinatorError::Transport(TransportError::Closed)),
            RpcStatus::Transport("stream closed".to_string())
        );
    }
}
