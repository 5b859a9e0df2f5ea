//! Messages exchanged over the RPC surface.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Free-form text carried in both directions of the ping-pong stream.
///
/// `message` is the only required field. `correlation_id` is attached by the
/// server to every push and may be echoed back by peers that understand it;
/// it is omitted from the encoding when absent so minimal peers never see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    /// The text payload.
    pub message: String,

    /// Identifier of the trigger this message belongs to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
}

impl TextMessage {
    /// Create a message without a correlation id.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            correlation_id: None,
        }
    }

    /// Attach a correlation id.
    pub fn with_correlation_id(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Build the reply a well-behaved peer sends for this message: new text,
    /// same correlation id.
    pub fn reply(&self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            correlation_id: self.correlation_id,
        }
    }
}

/// How a trigger call ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// No stream was registered; nothing was sent.
    NoActiveStream,
    /// The push was handed to the stream; no reply was awaited.
    #[default]
    Sent,
    /// The push was sent and a reply came back in time.
    Replied,
    /// The push was sent but no reply arrived within the wait window.
    ReplyTimedOut,
    /// The push was sent but the stream ended before a reply arrived.
    StreamEnded,
}

/// Answer of the trigger call. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Outcome of the trigger.
    #[serde(default)]
    pub status: AckStatus,

    /// Identifier assigned to the pushed message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<u64>,

    /// The peer's reply, when one was correlated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl Acknowledgment {
    /// Acknowledgment for a trigger that found no stream.
    pub fn no_active_stream() -> Self {
        Self {
            status: AckStatus::NoActiveStream,
            ..Self::default()
        }
    }
}

/// Milliseconds since the Unix epoch, used to stamp ping and pong texts.
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
