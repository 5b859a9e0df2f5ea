//! The trigger operation: push a ping into the active stream and,
//! optionally, wait for the peer's answer.

use crossline_core::{AckStatus, Acknowledgment, CallContext, DoneReason};

use crate::correlation::PeerMessage;
use crate::registry::{StreamId, StreamRegistry};
use crate::trigger_channel::TriggerMessage;
use crate::{CoordinatorConfig, CoordinatorError};

/// Successful results of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No stream is registered; nothing was sent.
    NoActiveStream,
    /// The push was queued; replies were not awaited.
    Sent {
        /// Id of the push.
        trigger_id: u64,
        /// Stream it was queued on.
        stream: StreamId,
    },
    /// The peer answered in time.
    Replied {
        /// Id of the push.
        trigger_id: u64,
        /// Stream it was queued on.
        stream: StreamId,
        /// The correlated reply.
        reply: PeerMessage,
    },
    /// No answer within the wait window.
    ReplyTimedOut {
        /// Id of the push.
        trigger_id: u64,
        /// Stream it was queued on.
        stream: StreamId,
    },
    /// The stream ended while waiting.
    StreamEnded {
        /// Id of the push.
        trigger_id: u64,
        /// Stream it was queued on.
        stream: StreamId,
    },
}

impl TriggerOutcome {
    /// The correlated reply, if any.
    pub fn reply(&self) -> Option<&PeerMessage> {
        match self {
            TriggerOutcome::Replied { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// Id of the push, if one was made.
    pub fn trigger_id(&self) -> Option<u64> {
        match self {
            TriggerOutcome::NoActiveStream => None,
            TriggerOutcome::Sent { trigger_id, .. }
            | TriggerOutcome::Replied { trigger_id, .. }
            | TriggerOutcome::ReplyTimedOut { trigger_id, .. }
            | TriggerOutcome::StreamEnded { trigger_id, .. } => Some(*trigger_id),
        }
    }
}

impl From<TriggerOutcome> for Acknowledgment {
    fn from(outcome: TriggerOutcome) -> Self {
        let trigger_id = outcome.trigger_id();
        match outcome {
            TriggerOutcome::NoActiveStream => Acknowledgment::no_active_stream(),
            TriggerOutcome::Sent { .. } => Acknowledgment {
                status: AckStatus::Sent,
                trigger_id,
                reply: None,
            },
            TriggerOutcome::Replied { reply, .. } => Acknowledgment {
                status: AckStatus::Replied,
                trigger_id,
                reply: Some(reply.text),
            },
            TriggerOutcome::ReplyTimedOut { .. } => Acknowledgment {
                status: AckStatus::ReplyTimedOut,
                trigger_id,
                reply: None,
            },
            TriggerOutcome::StreamEnded { .. } => Acknowledgment {
                status: AckStatus::StreamEnded,
                trigger_id,
                reply: None,
            },
        }
    }
}

/// Push a ping into the registered stream.
///
/// Never blocks when no stream is registered. Every other suspension is
/// bounded: the enqueue by `config.enqueue_timeout` and the caller's
/// deadline, the reply wait by `config.reply_timeout`.
///
/// # Errors
///
/// Only failures to hand the push to the stream (`EnqueueTimeout`,
/// `StreamClosed`) and caller cancellation (`Cancelled`).
pub async fn fire(
    registry: &StreamRegistry,
    config: &CoordinatorConfig,
    ctx: &CallContext,
) -> Result<TriggerOutcome, CoordinatorError> {
    let Some(handle) = registry.get() else {
        tracing::info!("no active ping-pong stream");
        return Ok(TriggerOutcome::NoActiveStream);
    };
    let stream = handle.id();

    let message = TriggerMessage::ping();
    let trigger_id = message.id;
    let mut ticket = config
        .await_reply
        .then(|| handle.correlation().ticket(trigger_id));

    tracing::info!(%stream, trigger_id, "triggering ping-pong stream");
    if let Err(e) = handle
        .triggers()
        .enqueue(message, ctx, config.enqueue_timeout)
        .await
    {
        tracing::warn!(%stream, trigger_id, error = %e, "could not hand trigger to stream");
        return Err(e);
    }

    let Some(ticket) = ticket.as_mut() else {
        return Ok(TriggerOutcome::Sent { trigger_id, stream });
    };

    let outcome = tokio::select! {
        biased;
        reply = ticket.wait(config.reply_timeout) => match reply {
            Some(reply) => {
                tracing::info!(%stream, trigger_id, reply = %reply.text, "trigger got its reply");
                TriggerOutcome::Replied { trigger_id, stream, reply }
            }
            None => {
                tracing::warn!(
                    %stream,
                    trigger_id,
                    timeout = ?config.reply_timeout,
                    "no reply from client in time"
                );
                TriggerOutcome::ReplyTimedOut { trigger_id, stream }
            }
        },
        _ = handle.closed().cancelled() => {
            tracing::info!(%stream, trigger_id, "stream ended before a reply arrived");
            TriggerOutcome::StreamEnded { trigger_id, stream }
        }
        reason = ctx.done() => match reason {
            DoneReason::Cancelled => return Err(CoordinatorError::Cancelled),
            DoneReason::DeadlineExceeded => {
                tracing::warn!(%stream, trigger_id, "caller deadline passed while waiting for reply");
                TriggerOutcome::ReplyTimedOut { trigger_id, stream }
            }
        },
    };
    Ok(outcome)
}
