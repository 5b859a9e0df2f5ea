//! # crossline-core
//!
//! Core abstractions shared by the crossline crates.
//!
//! - **Messages**: [`TextMessage`] (the single wire payload) and
//!   [`Acknowledgment`] (the trigger call's answer)
//! - **Call contexts**: [`CallContext`], cancellation plus an optional deadline
//! - **Stream traits**: [`StreamSink`] / [`StreamSource`], the two halves of a
//!   bidirectional stream, bundled as a [`ServerStream`]
//! - **Service surface**: [`PingPongService`], implemented by the coordinator
//!   and driven by a transport
//! - **In-memory streams**: [`mem::duplex`] for tests and embedding

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod context;
mod message;
mod service;
mod stream;

pub mod mem;

pub use context::{CallContext, DoneReason};
pub use message::{AckStatus, Acknowledgment, TextMessage, unix_millis};
pub use service::{PingPongService, RpcStatus};
pub use stream::{ServerStream, StreamSink, StreamSource, TransportError};
