//! Counters for what the coordinator has done so far.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, shared by the coordinator and its stream loops.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    triggers: AtomicU64,
    pushes_sent: AtomicU64,
    replies_forwarded: AtomicU64,
    replies_dropped: AtomicU64,
    streams_served: AtomicU64,
}

/// Point-in-time copy of [`CoordinatorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Trigger calls received.
    pub triggers: u64,
    /// Pushes written to a peer.
    pub pushes_sent: u64,
    /// Replies handed to a waiting trigger.
    pub replies_forwarded: u64,
    /// Replies dropped because nobody could take them.
    pub replies_dropped: u64,
    /// Streams that have completed their loop.
    pub streams_served: u64,
}

impl CoordinatorStats {
    pub(crate) fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_push_sent(&self) {
        self.pushes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reply_forwarded(&self) {
        self.replies_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reply_dropped(&self) {
        self.replies_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stream_served(&self) {
        self.streams_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            triggers: self.triggers.load(Ordering::Relaxed),
            pushes_sent: self.pushes_sent.load(Ordering::Relaxed),
            replies_forwarded: self.replies_forwarded.load(Ordering::Relaxed),
            replies_dropped: self.replies_dropped.load(Ordering::Relaxed),
            streams_served: self.streams_served.load(Ordering::Relaxed),
        }
    }
}
