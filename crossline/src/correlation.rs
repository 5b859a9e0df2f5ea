//! Routing of peer replies back to waiting trigger calls.
//!
//! Two modes:
//!
//! - [`CorrelationMode::Arrival`]: the next reply goes to whichever waiter
//!   reads the bounded reply queue first. Replies that arrived before a
//!   waiter's ticket was issued are stale for that waiter and skipped.
//! - [`CorrelationMode::Tagged`]: replies carrying a `correlation_id` go to
//!   the trigger with that id; untagged replies cannot be matched.
//!
//! In both modes the stream loop only ever [`offer`](CorrelationChannel::offer)s,
//! which never blocks: with nobody waiting, or a full queue, the reply is
//! dropped and the caller is told why.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossline_core::TextMessage;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// How replies are matched to triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// First waiter to read gets the next reply.
    #[default]
    Arrival,
    /// Replies are routed by their correlation id.
    Tagged,
}

impl fmt::Display for CorrelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationMode::Arrival => write!(f, "arrival"),
            CorrelationMode::Tagged => write!(f, "tagged"),
        }
    }
}

impl FromStr for CorrelationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arrival" => Ok(CorrelationMode::Arrival),
            "tagged" => Ok(CorrelationMode::Tagged),
            other => Err(format!("unknown correlation mode: {other}")),
        }
    }
}

/// A message received from the peer, stamped on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    /// Text sent by the peer.
    pub text: String,
    /// Correlation id echoed by the peer, if any.
    pub correlation_id: Option<u64>,
    /// When the stream loop dequeued it.
    pub received_at: Instant,
}

impl PeerMessage {
    /// Stamp `msg` with the current instant.
    pub fn received(msg: TextMessage) -> Self {
        Self {
            text: msg.message,
            correlation_id: msg.correlation_id,
            received_at: Instant::now(),
        }
    }
}

/// What happened to an offered reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Handed to the reply queue or directly to the matching waiter.
    Forwarded,
    /// No trigger is waiting for it.
    NoWaiter,
    /// The reply queue is full.
    Full,
    /// Tagged mode, but the reply carries no correlation id.
    Unmatched,
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offer::Forwarded => write!(f, "forwarded"),
            Offer::NoWaiter => write!(f, "no trigger waiting"),
            Offer::Full => write!(f, "reply queue full"),
            Offer::Unmatched => write!(f, "reply has no correlation id"),
        }
    }
}

/// Bounded reply handoff for one stream.
#[derive(Debug)]
pub struct CorrelationChannel {
    mode: CorrelationMode,
    tx: mpsc::Sender<PeerMessage>,
    rx: tokio::sync::Mutex<mpsc::Receiver<PeerMessage>>,
    /// Arrival-mode tickets currently alive.
    waiting: AtomicUsize,
    /// Tagged-mode tickets by trigger id.
    tagged: Mutex<HashMap<u64, oneshot::Sender<PeerMessage>>>,
}

impl CorrelationChannel {
    /// Create a channel whose reply queue holds `capacity` replies (minimum 1).
    pub fn new(mode: CorrelationMode, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            mode,
            tx,
            rx: tokio::sync::Mutex::new(rx),
            waiting: AtomicUsize::new(0),
            tagged: Mutex::new(HashMap::new()),
        }
    }

    /// The matching mode.
    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    /// Number of triggers currently holding a ticket.
    pub fn waiting(&self) -> usize {
        match self.mode {
            CorrelationMode::Arrival => self.waiting.load(Ordering::SeqCst),
            CorrelationMode::Tagged => self.tagged_slots().len(),
        }
    }

    /// Register interest in the reply to `trigger_id`.
    ///
    /// Take the ticket before the push is queued so that a fast reply is
    /// never offered while nobody is registered.
    pub fn ticket(self: &Arc<Self>, trigger_id: u64) -> ReplyTicket {
        let slot = match self.mode {
            CorrelationMode::Arrival => {
                self.waiting.fetch_add(1, Ordering::SeqCst);
                TicketSlot::Arrival
            }
            CorrelationMode::Tagged => {
                let (tx, rx) = oneshot::channel();
                self.tagged_slots().insert(trigger_id, tx);
                TicketSlot::Tagged(Some(rx))
            }
        };
        ReplyTicket {
            channel: Arc::clone(self),
            trigger_id,
            issued_at: Instant::now(),
            slot,
        }
    }

    /// Forward a reply without blocking.
    pub fn offer(&self, reply: PeerMessage) -> Offer {
        match self.mode {
            CorrelationMode::Arrival => {
                if self.waiting.load(Ordering::SeqCst) == 0 {
                    return Offer::NoWaiter;
                }
                match self.tx.try_send(reply) {
                    Ok(()) => Offer::Forwarded,
                    Err(mpsc::error::TrySendError::Full(_)) => Offer::Full,
                    Err(mpsc::error::TrySendError::Closed(_)) => Offer::NoWaiter,
                }
            }
            CorrelationMode::Tagged => {
                let Some(id) = reply.correlation_id else {
                    return Offer::Unmatched;
                };
                let slot = self.tagged_slots().remove(&id);
                match slot.map(|tx| tx.send(reply)) {
                    Some(Ok(())) => Offer::Forwarded,
                    _ => Offer::NoWaiter,
                }
            }
        }
    }

    async fn next_since(&self, issued_at: Instant) -> Option<PeerMessage> {
        let mut rx = self.rx.lock().await;
        loop {
            let reply = rx.recv().await?;
            if reply.received_at < issued_at {
                tracing::debug!(
                    reply = %reply.text,
                    "discarding reply that arrived before this trigger"
                );
                continue;
            }
            return Some(reply);
        }
    }

    fn tagged_slots(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<PeerMessage>>> {
        self.tagged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum TicketSlot {
    Arrival,
    Tagged(Option<oneshot::Receiver<PeerMessage>>),
}

/// A trigger's claim on the next matching reply. Dropping it withdraws the
/// claim.
pub struct ReplyTicket {
    channel: Arc<CorrelationChannel>,
    trigger_id: u64,
    issued_at: Instant,
    slot: TicketSlot,
}

impl ReplyTicket {
    /// The trigger this ticket waits for.
    pub fn trigger_id(&self) -> u64 {
        self.trigger_id
    }

    /// Wait up to `timeout` for the reply. `None` when none arrived in time.
    pub async fn wait(&mut self, timeout: Duration) -> Option<PeerMessage> {
        match &mut self.slot {
            TicketSlot::Arrival => {
                let channel = Arc::clone(&self.channel);
                tokio::time::timeout(timeout, channel.next_since(self.issued_at))
                    .await
                    .ok()
                    .flatten()
            }
            TicketSlot::Tagged(slot) => {
                let rx = slot.as_mut()?;
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(reply)) => {
                        *slot = None;
                        Some(reply)
                    }
                    Ok(Err(_)) => {
                        *slot = None;
                        None
                    }
                    Err(_) => None,
                }
            }
        }
    }
}

impl Drop for ReplyTicket {
    fn drop(&mut self) {
        match self.slot {
            TicketSlot::Arrival => {
                self.channel.waiting.fetch_sub(1, Ordering::SeqCst);
            }
            TicketSlot::Tagged(_) => {
                self.channel.tagged_slots().remove(&self.trigger_id);
            }
        }
    }
}

impl fmt::Debug for ReplyTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTicket")
            .field("trigger_id", &self.trigger_id)
            .field("mode", &self.channel.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str, correlation_id: Option<u64>) -> PeerMessage {
        PeerMessage::received(TextMessage {
            message: text.to_string(),
            correlation_id,
        })
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("arrival".parse(), Ok(CorrelationMode::Arrival));
        assert_eq!("Tagged".parse(), Ok(CorrelationMode::Tagged));
        assert!("random".parse::<CorrelationMode>().is_err());
    }

    #[tokio::test]
    async fn test_offer_without_waiter_is_dropped() {
        let channel = CorrelationChannel::new(CorrelationMode::Arrival, 1);
        assert_eq!(channel.offer(reply("pong", None)), Offer::NoWaiter);
    }

    #[tokio::test]
    async fn test_arrival_reply_reaches_waiter() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Arrival, 1));
        let mut ticket = channel.ticket(1);
        assert_eq!(channel.waiting(), 1);

        assert_eq!(channel.offer(reply("pong", None)), Offer::Forwarded);
        let got = ticket.wait(Duration::from_secs(1)).await.expect("reply");
        assert_eq!(got.text, "pong");

        drop(ticket);
        assert_eq!(channel.waiting(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Arrival, 1));
        let _ticket = channel.ticket(1);
        assert_eq!(channel.offer(reply("first", None)), Offer::Forwarded);
        assert_eq!(channel.offer(reply("second", None)), Offer::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_skipped() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Arrival, 1));
        let abandoned = channel.ticket(1);
        assert_eq!(channel.offer(reply("late", None)), Offer::Forwarded);
        drop(abandoned);

        tokio::time::advance(Duration::from_millis(10)).await;
        let mut fresh = channel.ticket(2);
        assert_eq!(fresh.wait(Duration::from_secs(1)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_single_reply_two_waiters() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Arrival, 1));
        let mut a = channel.ticket(1);
        let mut b = channel.ticket(2);
        assert_eq!(channel.offer(reply("only", None)), Offer::Forwarded);

        let (ra, rb) = tokio::join!(
            a.wait(Duration::from_secs(5)),
            b.wait(Duration::from_secs(5))
        );
        assert_eq!(ra.is_some() as u8 + rb.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn test_tagged_routes_by_id() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Tagged, 1));
        let mut first = channel.ticket(10);
        let mut second = channel.ticket(11);

        assert_eq!(channel.offer(reply("for 11", Some(11))), Offer::Forwarded);
        assert_eq!(channel.offer(reply("for 10", Some(10))), Offer::Forwarded);

        let got = second.wait(Duration::from_secs(1)).await.expect("reply");
        assert_eq!(got.text, "for 11");
        let got = first.wait(Duration::from_secs(1)).await.expect("reply");
        assert_eq!(got.text, "for 10");
    }

    #[tokio::test]
    async fn test_tagged_rejects_untagged_and_unknown() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Tagged, 1));
        let ticket = channel.ticket(5);
        assert_eq!(channel.offer(reply("anon", None)), Offer::Unmatched);
        assert_eq!(channel.offer(reply("other", Some(6))), Offer::NoWaiter);

        drop(ticket);
        assert_eq!(channel.waiting(), 0);
        assert_eq!(channel.offer(reply("late", Some(5))), Offer::NoWaiter);
    }

    #[tokio::test]
    async fn test_tagged_slot_takes_one_reply() {
        let channel = Arc::new(CorrelationChannel::new(CorrelationMode::Tagged, 1));
        let mut ticket = channel.ticket(8);

        assert_eq!(channel.offer(reply("first", Some(8))), Offer::Forwarded);
        assert_eq!(channel.offer(reply("second", Some(8))), Offer::NoWaiter);

        let got = ticket.wait(Duration::from_secs(1)).await.expect("reply");
        assert_eq!(got.text, "first");
        assert_eq!(got.correlation_id, Some(8));
    }
}
