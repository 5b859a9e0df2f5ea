//! Framed halves of a TCP connection, and their adaptation to the
//! coordinator's stream traits.

use std::sync::Arc;

use async_trait::async_trait;
use crossline_core::{StreamSink, StreamSource, TextMessage, TransportError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::wire::{Frame, WireError, encode_frame, try_decode_frame};

/// Reads whole frames off a byte stream.
///
/// `read_frame` is cancel safe: bytes already read stay buffered until a
/// complete frame can be parsed.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    read_buffer: Vec<u8>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `inner`, reading `chunk_size` bytes at a time.
    pub fn new(inner: R, chunk_size: usize) -> Self {
        Self {
            inner,
            read_buffer: Vec::with_capacity(chunk_size),
            chunk: vec![0; chunk_size.max(1)],
        }
    }

    /// Next frame, or `None` when the peer closed at a frame boundary.
    ///
    /// # Errors
    ///
    /// `Truncated` if the stream ends mid-frame, `Io` on socket failure,
    /// and any parse error from the wire layer.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, WireError> {
        loop {
            if let Some((frame, consumed)) = try_decode_frame(&self.read_buffer)? {
                self.read_buffer.drain(..consumed);
                return Ok(Some(frame));
            }

            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }
                return Err(WireError::Truncated {
                    buffered: self.read_buffer.len(),
                });
            }
            self.read_buffer.extend_from_slice(&self.chunk[..n]);
            tracing::trace!(
                bytes = n,
                buffered = self.read_buffer.len(),
                "read from connection"
            );
        }
    }
}

/// Writes whole frames to a byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode and flush one frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError> {
        let data = encode_frame(frame)?;
        self.inner.write_all(&data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write direction; the peer reads EOF.
    pub async fn shutdown(&mut self) -> Result<(), WireError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Writer shared between a stream's sink and the call that ends it with a
/// status frame.
pub(crate) type SharedWriter = Arc<Mutex<FrameWriter<OwnedWriteHalf>>>;

/// Send half of a server-side ping-pong stream.
pub(crate) struct TcpSink {
    writer: SharedWriter,
}

impl TcpSink {
    pub(crate) fn new(writer: SharedWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl StreamSink for TcpSink {
    async fn send(&mut self, msg: TextMessage) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_frame(&Frame::Message(msg)).await?;
        Ok(())
    }
}

/// Receive half of a server-side ping-pong stream.
pub(crate) struct TcpSource {
    reader: FrameReader<OwnedReadHalf>,
}

impl TcpSource {
    pub(crate) fn new(reader: FrameReader<OwnedReadHalf>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl StreamSource for TcpSource {
    async fn recv(&mut self) -> Result<Option<TextMessage>, TransportError> {
        match self.reader.read_frame().await? {
            Some(Frame::Message(msg)) => Ok(Some(msg)),
            Some(Frame::End) | None => Ok(None),
            Some(other) => Err(TransportError::Protocol(format!(
                "unexpected frame on ping-pong stream: {other:?}"
            ))),
        }
    }
}
