//! Per-stream event loop.
//!
//! # Lifecycle
//!
//! ```text
//! ┌────────────┐  registered  ┌────────┐  close / error / cancel  ┌──────────┐
//! │Registering ├─────────────►│ Active ├─────────────────────────►│ Draining │
//! └────────────┘              └────────┘                          └────┬─────┘
//!                                                                      │
//!                                                                      ▼
//!                                                                ┌────────────┐
//!                                                                │ Terminated │
//!                                                                └────────────┘
//! ```
//!
//! Two tasks per stream:
//!
//! - a **receive task** owning the stream's receive half, turning every
//!   `recv()` result into a [`PeerEvent`] and nothing else;
//! - the **loop** itself, owning the send half, which selects over peer
//!   events, queued pushes and the stream's cancellation.
//!
//! Only the loop touches shared state. Replies are offered to the
//! correlation channel without blocking; pushes are written in the order
//! they are dequeued.

use std::sync::Arc;

use crossline_core::{
    CallContext, ServerStream, StreamSink, StreamSource, TextMessage, TransportError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::correlation::{CorrelationChannel, Offer, PeerMessage};
use crate::registry::{StreamHandle, StreamRegistry};
use crate::stats::CoordinatorStats;
use crate::trigger_channel::{TriggerReceiver, trigger_channel};
use crate::{CoordinatorConfig, CoordinatorError};

/// Where a stream loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Installing the handle and starting the receive task.
    Registering,
    /// Multiplexing peer messages, pushes and cancellation.
    Active,
    /// Unregistering and releasing resources.
    Draining,
    /// Done.
    Terminated,
}

/// How a stream ended when it ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer closed the stream gracefully.
    Disconnected,
    /// The stream's context was cancelled (transport teardown or shutdown).
    Cancelled,
}

/// What the receive task reports.
#[derive(Debug)]
enum PeerEvent {
    Message(TextMessage),
    Closed,
    Failed(TransportError),
}

/// The loop owning one physical stream.
pub struct StreamLoop {
    state: LoopState,
    handle: StreamHandle,
    registry: Arc<StreamRegistry>,
    stats: Arc<CoordinatorStats>,
    sink: Box<dyn StreamSink>,
    triggers: TriggerReceiver,
    peer_events: mpsc::Receiver<PeerEvent>,
    receiver: JoinHandle<()>,
    context: CallContext,
}

impl StreamLoop {
    /// Register `stream` as the active stream and start its receive task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        stream: ServerStream,
        registry: Arc<StreamRegistry>,
        config: &CoordinatorConfig,
        stats: Arc<CoordinatorStats>,
    ) -> Self {
        let peer = stream.peer().to_string();
        let (sink, source, context) = stream.into_parts();

        let (trigger_tx, triggers) = trigger_channel(config.trigger_capacity);
        let correlation = Arc::new(CorrelationChannel::new(
            config.correlation,
            config.correlation_capacity,
        ));
        let handle = StreamHandle::new(peer, trigger_tx, correlation);
        let mut state = LoopState::Registering;
        tracing::debug!(stream = %handle.id(), ?state, "stream loop starting");

        registry.register(handle.clone());

        let (event_tx, peer_events) = mpsc::channel(config.peer_buffer.max(1));
        let receiver = tokio::spawn(receive_task(source, event_tx));

        state = LoopState::Active;
        tracing::debug!(stream = %handle.id(), ?state, "stream loop registered");
        tracing::info!(stream = %handle.id(), peer = %handle.peer(), "started ping-pong stream");

        Self {
            state,
            handle,
            registry,
            stats,
            sink,
            triggers,
            peer_events,
            receiver,
            context,
        }
    }

    /// Handle of the stream this loop owns.
    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until the stream ends, then unregister.
    ///
    /// # Errors
    ///
    /// `CoordinatorError::Transport` when sending or receiving failed for any
    /// reason other than a clean close.
    pub async fn run(mut self) -> Result<StreamEnd, CoordinatorError> {
        let id = self.handle.id();
        let end = loop {
            tokio::select! {
                reason = self.context.done() => {
                    tracing::info!(stream = %id, ?reason, "stream context ended");
                    break Ok(StreamEnd::Cancelled);
                }

                trigger = self.triggers.recv() => {
                    let Some(trigger) = trigger else {
                        break Ok(StreamEnd::Cancelled);
                    };
                    tracing::debug!(stream = %id, trigger_id = trigger.id, "pushing triggered ping");
                    let sent = tokio::select! {
                        sent = self.sink.send(trigger.to_text_message()) => sent,
                        _ = self.context.done() => break Ok(StreamEnd::Cancelled),
                    };
                    match sent {
                        Ok(()) => self.stats.record_push_sent(),
                        Err(e) => {
                            tracing::warn!(stream = %id, error = %e, "failed to push to peer");
                            break Err(CoordinatorError::Transport(e));
                        }
                    }
                }

                event = self.peer_events.recv() => match event {
                    Some(PeerEvent::Message(msg)) => self.forward_reply(msg),
                    Some(PeerEvent::Closed) | None => {
                        tracing::info!(stream = %id, "client disconnected");
                        break Ok(StreamEnd::Disconnected);
                    }
                    Some(PeerEvent::Failed(e)) => {
                        tracing::warn!(stream = %id, error = %e, "receive error");
                        break Err(CoordinatorError::Transport(e));
                    }
                },
            }
        };

        self.drain();
        end
    }

    fn forward_reply(&mut self, msg: TextMessage) {
        let reply = PeerMessage::received(msg);
        tracing::info!(
            stream = %self.handle.id(),
            reply = %reply.text,
            correlation_id = ?reply.correlation_id,
            "received reply from client"
        );
        match self.handle.correlation().offer(reply) {
            Offer::Forwarded => self.stats.record_reply_forwarded(),
            dropped => {
                tracing::debug!(stream = %self.handle.id(), reason = %dropped, "dropping reply");
                self.stats.record_reply_dropped();
            }
        }
    }

    fn drain(&mut self) {
        if matches!(self.state, LoopState::Draining | LoopState::Terminated) {
            return;
        }
        let id = self.handle.id();
        self.state = LoopState::Draining;
        tracing::debug!(stream = %id, state = ?self.state, "stream loop draining");

        if !self.registry.unregister(&self.handle) {
            tracing::debug!(stream = %id, "registry already points at a newer stream");
        }

        self.receiver.abort();
        let dropped = self.triggers.close_and_drain();
        if dropped > 0 {
            tracing::warn!(stream = %id, dropped, "discarding pushes queued on a closing stream");
        }
        self.handle.closed().cancel();

        self.state = LoopState::Terminated;
        self.stats.record_stream_served();
        tracing::info!(stream = %id, "ping-pong stream ended and cleaned up");
    }
}

impl Drop for StreamLoop {
    fn drop(&mut self) {
        self.drain();
    }
}

async fn receive_task(mut source: Box<dyn StreamSource>, events: mpsc::Sender<PeerEvent>) {
    loop {
        let event = match source.recv().await {
            Ok(Some(msg)) => PeerEvent::Message(msg),
            Ok(None) => PeerEvent::Closed,
            Err(e) => PeerEvent::Failed(e),
        };
        let last = !matches!(event, PeerEvent::Message(_));
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossline_core::mem;

    use super::*;
    use crate::trigger_channel::TriggerMessage;

    fn start(stream: ServerStream, registry: &Arc<StreamRegistry>) -> StreamLoop {
        StreamLoop::start(
            stream,
            Arc::clone(registry),
            &CoordinatorConfig::default(),
            Arc::new(CoordinatorStats::default()),
        )
    }

    #[tokio::test]
    async fn test_start_registers_handle() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, _peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);

        assert_eq!(stream_loop.state(), LoopState::Active);
        assert_eq!(registry.get().as_ref(), Some(stream_loop.handle()));
    }

    #[tokio::test]
    async fn test_clean_close_unregisters() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, mut peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);
        let handle = stream_loop.handle().clone();

        peer.close_send();
        let end = stream_loop.run().await;

        assert_eq!(end, Ok(StreamEnd::Disconnected));
        assert!(!registry.is_active());
        assert!(handle.closed().is_cancelled());
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, mut peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);

        peer.fail(TransportError::Reset("peer vanished".to_string())).await;
        let end = stream_loop.run().await;

        assert_eq!(
            end,
            Err(CoordinatorError::Transport(TransportError::Reset(
                "peer vanished".to_string()
            )))
        );
        assert!(!registry.is_active());
    }

    #[tokio::test]
    async fn test_cancellation_ends_loop() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);

        peer.abort();
        assert_eq!(stream_loop.run().await, Ok(StreamEnd::Cancelled));
        assert!(!registry.is_active());
    }

    #[tokio::test]
    async fn test_push_reaches_peer() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, mut peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);
        let handle = stream_loop.handle().clone();
        let task = tokio::spawn(stream_loop.run());

        let trigger = TriggerMessage::ping();
        handle
            .triggers()
            .enqueue(trigger.clone(), &CallContext::new(), Duration::from_secs(1))
            .await
            .expect("enqueue");

        assert_eq!(peer.recv().await, Some(trigger.to_text_message()));

        peer.close_send();
        assert_eq!(task.await.expect("join"), Ok(StreamEnd::Disconnected));
    }

    #[tokio::test]
    async fn test_superseded_loop_does_not_clear_successor() {
        let registry = Arc::new(StreamRegistry::new());
        let (first_stream, mut first_peer) = mem::duplex(1);
        let first = start(first_stream, &registry);

        let (second_stream, _second_peer) = mem::duplex(1);
        let second = start(second_stream, &registry);
        let second_handle = second.handle().clone();

        first_peer.close_send();
        assert_eq!(first.run().await, Ok(StreamEnd::Disconnected));

        assert_eq!(registry.get(), Some(second_handle));
        drop(second);
        assert!(!registry.is_active());
    }

    #[tokio::test]
    async fn test_dropping_loop_unregisters() {
        let registry = Arc::new(StreamRegistry::new());
        let (stream, _peer) = mem::duplex(1);
        let stream_loop = start(stream, &registry);
        assert!(registry.is_active());
        drop(stream_loop);
        assert!(!registry.is_active());
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl StreamSink for FailingSink {
        async fn send(&mut self, _msg: TextMessage) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    struct SilentSource;

    #[async_trait::async_trait]
    impl StreamSource for SilentSource {
        async fn recv(&mut self) -> Result<Option<TextMessage>, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_push_failure_ends_loop() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = ServerStream::new(
            Box::new(FailingSink),
            Box::new(SilentSource),
            CallContext::new(),
        );
        let stream_loop = start(stream, &registry);
        let handle = stream_loop.handle().clone();

        handle
            .triggers()
            .enqueue(TriggerMessage::ping(), &CallContext::new(), Duration::from_secs(1))
            .await
            .expect("enqueue");
        let end = stream_loop.run().await;

        assert_eq!(end, Err(CoordinatorError::Transport(TransportError::Closed)));
        assert!(!registry.is_active());
        assert!(handle.closed().is_cancelled());
    }
}
