//! Configuration for the trigger/stream coordinator.

use std::time::Duration;

use crate::correlation::CorrelationMode;

/// Tuning knobs for triggers, stream loops and their channels.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// How long a trigger waits for the peer's reply once its push is queued.
    pub reply_timeout: Duration,

    /// Upper bound on handing a push to the stream loop. The caller's own
    /// deadline applies too; the earlier one wins.
    pub enqueue_timeout: Duration,

    /// Whether triggers wait for a reply at all.
    pub await_reply: bool,

    /// Pushes that may sit in a stream's trigger channel before enqueue blocks.
    pub trigger_capacity: usize,

    /// Replies that may sit in a stream's correlation channel before new ones
    /// are dropped.
    pub correlation_capacity: usize,

    /// Peer events buffered between a stream's receive task and its loop.
    pub peer_buffer: usize,

    /// How replies are matched to waiting triggers.
    pub correlation: CorrelationMode,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            enqueue_timeout: Duration::from_secs(5),
            await_reply: true,
            trigger_capacity: 1,
            correlation_capacity: 1,
            peer_buffer: 1,
            correlation: CorrelationMode::Arrival,
        }
    }
}

impl CoordinatorConfig {
    /// Triggers return as soon as the push is queued.
    pub fn fire_and_forget() -> Self {
        Self {
            await_reply: false,
            ..Self::default()
        }
    }

    /// Replies are routed by correlation id instead of arrival order.
    pub fn tagged() -> Self {
        Self {
            correlation: CorrelationMode::Tagged,
            ..Self::default()
        }
    }

    /// Set the reply wait window.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the enqueue bound.
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Enable or disable waiting for replies.
    pub fn with_await_reply(mut self, await_reply: bool) -> Self {
        self.await_reply = await_reply;
        self
    }

    /// Set the correlation mode.
    pub fn with_correlation(mut self, mode: CorrelationMode) -> Self {
        self.correlation = mode;
        self
    }

    /// Set the trigger and correlation channel capacities (minimum 1).
    pub fn with_capacities(mut self, triggers: usize, replies: usize) -> Self {
        self.trigger_capacity = triggers.max(1);
        self.correlation_capacity = replies.max(1);
        self
    }
}
