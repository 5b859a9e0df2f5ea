//! # crossline-transport
//!
//! Framed TCP transport for the crossline RPC surface.
//!
//! ## Modules
//!
//! - [`wire`]: `[length:4][crc32c:4][json]` frames and the [`Frame`] enum
//! - [`connection`]: buffered, cancel-safe [`FrameReader`] and [`FrameWriter`]
//! - [`RpcServer`]: accepts connections and drives any
//!   [`PingPongService`](crossline_core::PingPongService)
//! - [`RpcClient`]: unary `trigger` calls and [`ClientStream`] for `ping_pong`
//!
//! One connection carries exactly one call. A ping-pong stream ends when
//! either side closes its connection; the server closes with a status frame.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod client;
mod config;
mod error;
mod server;

pub mod connection;
pub mod wire;

pub use client::{ClientStream, RpcClient};
pub use config::TransportConfig;
pub use connection::{FrameReader, FrameWriter};
pub use error::RpcError;
pub use server::RpcServer;
pub use wire::{Frame, HEADER_SIZE, MAX_PAYLOAD_SIZE, Method, WireError};
