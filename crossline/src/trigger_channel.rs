//! Handoff of pushes from trigger calls into a stream loop.
//!
//! Any number of [`TriggerSender`] clones feed exactly one
//! [`TriggerReceiver`]. The channel is bounded: when it is full, enqueueing
//! blocks, but never past the caller's deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossline_core::{CallContext, DoneReason, TextMessage, unix_millis};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::CoordinatorError;

static NEXT_TRIGGER_ID: AtomicU64 = AtomicU64::new(1);

/// A push requested by a trigger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMessage {
    /// Process-unique id; sent to the peer as the correlation id.
    pub id: u64,
    /// Text pushed to the peer.
    pub text: String,
    /// When the trigger built the message.
    pub created_at: Instant,
}

impl TriggerMessage {
    /// The server's ping, with a fresh id.
    pub fn ping() -> Self {
        Self {
            id: NEXT_TRIGGER_ID.fetch_add(1, Ordering::Relaxed),
            text: format!("Ping from server at {}", unix_millis()),
            created_at: Instant::now(),
        }
    }

    /// Wire form sent to the peer.
    pub fn to_text_message(&self) -> TextMessage {
        TextMessage::new(self.text.clone()).with_correlation_id(self.id)
    }
}

/// Create a trigger channel holding up to `capacity` pending pushes.
pub fn trigger_channel(capacity: usize) -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TriggerSender { tx }, TriggerReceiver { rx })
}

/// Producer side, held by the stream handle and cloned into trigger calls.
#[derive(Clone, Debug)]
pub struct TriggerSender {
    tx: mpsc::Sender<TriggerMessage>,
}

impl TriggerSender {
    /// Hand `message` to the stream loop.
    ///
    /// Blocks while the channel is full, bounded by the earlier of
    /// `ctx`'s deadline and `limit`.
    ///
    /// # Errors
    ///
    /// - `EnqueueTimeout` if the bound passes first
    /// - `Cancelled` if `ctx` is cancelled first
    /// - `StreamClosed` if the loop has stopped accepting
    pub async fn enqueue(
        &self,
        message: TriggerMessage,
        ctx: &CallContext,
        limit: Duration,
    ) -> Result<(), CoordinatorError> {
        let bounded = ctx.clone().with_timeout(limit);
        tokio::select! {
            biased;
            sent = self.tx.send(message) => sent.map_err(|_| CoordinatorError::StreamClosed),
            reason = bounded.done() => Err(match reason {
                DoneReason::Cancelled => CoordinatorError::Cancelled,
                DoneReason::DeadlineExceeded => CoordinatorError::EnqueueTimeout,
            }),
        }
    }

    /// Whether the receiving loop is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by one stream loop.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<TriggerMessage>,
}

impl TriggerReceiver {
    /// Next queued push.
    pub async fn recv(&mut self) -> Option<TriggerMessage> {
        self.rx.recv().await
    }

    /// Refuse further pushes and discard what is still queued.
    ///
    /// Returns how many pushes were discarded.
    pub fn close_and_drain(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
