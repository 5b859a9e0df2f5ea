//! The single-slot directory of the active stream.
//!
//! Every stream loop registers its [`StreamHandle`] when it starts and
//! removes it when it ends; trigger calls read the slot to find where to
//! push. A newer stream replaces an older one without closing it, so removal
//! is compare-and-clear: a superseded loop finishing late must not wipe out
//! its successor.
//!
//! ```text
//!   stream A opens        stream B opens        A ends           B ends
//!  ──────┬──────────────────────┬────────────────┬────────────────┬──────
//!   slot: A                slot: B          slot: B (no-op)   slot: empty
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationChannel;
use crate::trigger_channel::TriggerSender;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one physical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Handle to a live stream: where to push and where replies come back.
///
/// Cheap to clone. Two handles are equal when they refer to the same stream.
#[derive(Clone)]
pub struct StreamHandle {
    id: StreamId,
    peer: Arc<str>,
    triggers: TriggerSender,
    correlation: Arc<CorrelationChannel>,
    closed: CancellationToken,
}

impl StreamHandle {
    /// Assemble a handle for a new stream.
    pub fn new(
        peer: impl Into<Arc<str>>,
        triggers: TriggerSender,
        correlation: Arc<CorrelationChannel>,
    ) -> Self {
        Self {
            id: StreamId::next(),
            peer: peer.into(),
            triggers,
            correlation,
            closed: CancellationToken::new(),
        }
    }

    /// The stream's id.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Remote address of the stream.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Producer side of the stream's trigger channel.
    pub fn triggers(&self) -> &TriggerSender {
        &self.triggers
    }

    /// The stream's reply channel.
    pub fn correlation(&self) -> &Arc<CorrelationChannel> {
        &self.correlation
    }

    /// Cancelled once the owning loop has terminated.
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }
}

impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StreamHandle {}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Holder of the currently active stream.
///
/// All operations take the same lock and never hold it across an await.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    active: Mutex<Option<StreamHandle>>,
}

impl StreamRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the active stream, returning the one it replaced.
    ///
    /// The replaced stream keeps running; it just stops receiving triggers.
    pub fn register(&self, handle: StreamHandle) -> Option<StreamHandle> {
        let previous = self.slot().replace(handle);
        if let Some(old) = &previous {
            tracing::info!(superseded = %old.id(), "active stream replaced by a newer one");
        }
        previous
    }

    /// Clear the slot if it still holds `handle`. Returns whether it did.
    pub fn unregister(&self, handle: &StreamHandle) -> bool {
        let mut slot = self.slot();
        if slot.as_ref() == Some(handle) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Whether a stream is registered.
    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Clone of the active handle.
    pub fn get(&self) -> Option<StreamHandle> {
        self.slot().clone()
    }

    /// Id of the active stream.
    pub fn active_id(&self) -> Option<StreamId> {
        self.slot().as_ref().map(StreamHandle::id)
    }

    fn slot(&self) -> MutexGuard<'_, Option<StreamHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationMode;
    use crate::trigger_channel::trigger_channel;

    fn handle() -> StreamHandle {
        let (tx, _rx) = trigger_channel(1);
        let correlation = Arc::new(CorrelationChannel::new(CorrelationMode::Arrival, 1));
        StreamHandle::new("test", tx, correlation)
    }

    #[test]
    fn test_empty_registry() {
        let registry = StreamRegistry::new();
        assert!(!registry.is_active());
        assert!(registry.get().is_none());
    }

    #[test]
    fn test_register_unregister() {
        let registry = StreamRegistry::new();
        let a = handle();
        assert!(registry.register(a.clone()).is_none());
        assert!(registry.is_active());
        assert_eq!(registry.active_id(), Some(a.id()));

        assert!(registry.unregister(&a));
        assert!(!registry.is_active());
        assert!(!registry.unregister(&a));
    }

    #[test]
    fn test_stale_unregister_is_noop() {
        let registry = StreamRegistry::new();
        let a = handle();
        let b = handle();

        registry.register(a.clone());
        let replaced = registry.register(b.clone());
        assert_eq!(replaced, Some(a.clone()));

        assert!(!registry.unregister(&a));
        assert_eq!(registry.get(), Some(b.clone()));

        assert!(registry.unregister(&b));
        assert!(!registry.is_active());
    }

    #[test]
    fn test_handles_compare_by_id() {
        let a = handle();
        let b = handle();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.id() < b.id());
    }
}
