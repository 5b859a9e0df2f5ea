//! # crossline
//!
//! Push messages into a long-lived bidirectional stream from unrelated RPC
//! calls, and route the peer's answers back.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              crossline (this crate)                         │
//! │   Coordinator: registry, trigger/correlation channels,      │
//! │   stream loop, trigger operation; binaries                  │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  crossline-transport     │                                  │
//! │  • CRC32C-framed wire    │                                  │
//! │  • TCP RpcServer         │                                  │
//! │  • RpcClient/ClientStream│                                  │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │                     crossline-core                          │
//! │  TextMessage, Acknowledgment, CallContext,                  │
//! │  StreamSink/StreamSource, PingPongService, mem::duplex      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flow
//!
//! ```text
//!  ping_pong() ──► StreamLoop::start ──► registry.register(handle)
//!  trigger()   ──► registry.get() ──► trigger channel ──► loop ──► peer
//!  peer reply  ──► receive task ──► loop ──► correlation channel ──► trigger()
//!  stream end  ──► registry.unregister(handle)   (compare-and-clear)
//! ```
//!
//! Trigger enqueue blocks (bounded by a deadline); reply forwarding never
//! blocks and drops what nobody is waiting for.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use crossline_core::*;
pub use crossline_transport as transport;

/// Coordinator configuration.
pub mod config;

/// Reply routing from stream loops to trigger calls.
pub mod correlation;

/// The service object implementing both RPC methods.
pub mod coordinator;

/// Coordination errors.
pub mod error;

/// Single-slot registry of the active stream.
pub mod registry;

/// Client-side peer that answers pings, used by the binaries.
pub mod responder;

/// Counters.
pub mod stats;

/// Per-stream event loop.
pub mod stream_loop;

/// The trigger operation.
pub mod trigger;

/// Handoff of pushes into a stream loop.
pub mod trigger_channel;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use correlation::{CorrelationChannel, CorrelationMode, Offer, PeerMessage, ReplyTicket};
pub use error::CoordinatorError;
pub use registry::{StreamHandle, StreamId, StreamRegistry};
pub use stats::{CoordinatorStats, StatsSnapshot};
pub use stream_loop::{LoopState, StreamEnd, StreamLoop};
pub use trigger::{TriggerOutcome, fire};
pub use trigger_channel::{TriggerMessage, TriggerReceiver, TriggerSender, trigger_channel};
