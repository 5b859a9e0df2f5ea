//! Client side of the two RPC methods.

use std::time::Duration;

use crossline_core::{Acknowledgment, TextMessage};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::connection::{FrameReader, FrameWriter};
use crate::wire::{Frame, Method};
use crate::{RpcError, TransportConfig};

/// Opens one connection per call against a server address.
#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: String,
    config: TransportConfig,
}

impl RpcClient {
    /// Client for the server at `addr` (`host:port`). Nothing is dialed yet.
    pub fn new(addr: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    /// Server address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Call `trigger` with the configured default deadline.
    pub async fn trigger(&self) -> Result<Acknowledgment, RpcError> {
        self.trigger_with_timeout(self.config.call_timeout).await
    }

    /// Call `trigger` with an explicit deadline (`None` for no deadline).
    ///
    /// The deadline is sent to the server and also bounds the call locally,
    /// extended by `deadline_grace` so the server's own status can arrive.
    ///
    /// # Errors
    ///
    /// `Status` when the server rejects the call; `DeadlineExceeded` when the
    /// server stays silent past the deadline; connection and framing failures
    /// otherwise.
    pub async fn trigger_with_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Acknowledgment, RpcError> {
        let call = async {
            let (mut reader, mut writer) = self.open(Method::Trigger, timeout).await?;
            let response = reader.read_frame().await?;
            let _ = writer.shutdown().await;
            Ok::<_, RpcError>(response)
        };
        let response = match timeout {
            Some(deadline) => {
                let limit = deadline.saturating_add(self.config.deadline_grace);
                match tokio::time::timeout(limit, call).await {
                    Ok(response) => response?,
                    Err(_) => {
                        tracing::debug!(addr = %self.addr, ?deadline, "trigger deadline passed locally");
                        return Err(RpcError::DeadlineExceeded);
                    }
                }
            }
            None => call.await?,
        };
        match response {
            Some(Frame::Ack(ack)) => Ok(ack),
            Some(Frame::Status { error: Some(status) }) => Err(RpcError::Status(status)),
            Some(other) => Err(RpcError::UnexpectedFrame(format!("{other:?}"))),
            None => Err(RpcError::ConnectionClosed),
        }
    }

    /// Open a `ping_pong` stream.
    pub async fn ping_pong(&self) -> Result<ClientStream, RpcError> {
        let (reader, writer) = self.open(Method::PingPong, None).await?;
        Ok(ClientStream {
            reader,
            writer,
            finished: false,
        })
    }

    async fn open(
        &self,
        method: Method,
        timeout: Option<Duration>,
    ) -> Result<(FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>), RpcError> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.addr.as_str()),
        )
        .await
        .map_err(|_| RpcError::ConnectTimeout)?
        .map_err(|e| RpcError::Connect(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        let reader = FrameReader::new(read_half, self.config.read_chunk);
        let mut writer = FrameWriter::new(write_half);

        let timeout_ms = timeout.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        writer
            .write_frame(&Frame::Call { method, timeout_ms })
            .await?;
        tracing::debug!(addr = %self.addr, ?method, "call opened");
        Ok((reader, writer))
    }
}

/// Client end of a `ping_pong` stream.
#[derive(Debug)]
pub struct ClientStream {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    finished: bool,
}

impl ClientStream {
    /// Send one message to the server.
    pub async fn send(&mut self, msg: TextMessage) -> Result<(), RpcError> {
        self.writer.write_frame(&Frame::Message(msg)).await?;
        Ok(())
    }

    /// Next message from the server.
    ///
    /// `Ok(None)` once the server has ended the call successfully.
    ///
    /// # Errors
    ///
    /// `Status` if the server ended the call with a failure.
    pub async fn recv(&mut self) -> Result<Option<TextMessage>, RpcError> {
        if self.finished {
            return Ok(None);
        }
        match self.reader.read_frame().await? {
            Some(Frame::Message(msg)) => Ok(Some(msg)),
            Some(Frame::Status { error }) => {
                self.finished = true;
                match error {
                    Some(status) => Err(RpcError::Status(status)),
                    None => Ok(None),
                }
            }
            Some(Frame::End) | None => {
                self.finished = true;
                Ok(None)
            }
            Some(other) => Err(RpcError::UnexpectedFrame(format!("{other:?}"))),
        }
    }

    /// Tell the server nothing more will be sent. Receiving stays open until
    /// the server's final status.
    pub async fn close_send(&mut self) -> Result<(), RpcError> {
        self.writer.write_frame(&Frame::End).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
