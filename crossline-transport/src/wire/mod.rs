//! Wire format for frame serialization.
//!
//! Frame format: `[length:4][checksum:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of the payload for integrity verification
//! - **payload**: JSON encoding of a [`Frame`]

use crossline_core::{Acknowledgment, RpcStatus, TextMessage, TransportError};
use serde::{Deserialize, Serialize};

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (1MB).
///
/// Frames larger than this are rejected to prevent memory exhaustion.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max 1 MiB)")]
    FrameTooLarge {
        /// Actual payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },

    /// The connection ended in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    Truncated {
        /// Bytes of the incomplete frame.
        buffered: usize,
    },

    /// The payload is not a valid frame.
    #[error("malformed frame payload: {0}")]
    Malformed(String),

    /// Reading or writing the socket failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err.to_string())
    }
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Io(message) => TransportError::Io(message),
            WireError::Truncated { .. } => TransportError::Reset(err.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

/// RPC methods a call can open with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Unary trigger.
    Trigger,
    /// Bidirectional ping-pong stream.
    PingPong,
}

/// Everything that travels over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// First frame of every call, client to server.
    Call {
        /// Method being invoked.
        method: Method,
        /// Caller's deadline, relative to when the server reads this frame.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// A stream message, either direction.
    Message(TextMessage),
    /// Successful answer to a trigger.
    Ack(Acknowledgment),
    /// Final status of a call; `error` is absent on success.
    Status {
        /// Why the call failed, if it did.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcStatus>,
    },
    /// The sender will send nothing more on this stream.
    End,
}

/// Compute CRC32C checksum over the payload.
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32c::crc32c(payload)
}

/// Serialize a raw payload with the frame header.
///
/// Returns: `[length:4][checksum:4][payload:N]`
///
/// # Errors
///
/// Returns `FrameTooLarge` if payload exceeds MAX_PAYLOAD_SIZE.
pub fn serialize_payload(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let mut data = Vec::with_capacity(total_length);
    data.extend_from_slice(&(total_length as u32).to_le_bytes());
    data.extend_from_slice(&compute_checksum(payload).to_le_bytes());
    data.extend_from_slice(payload);
    Ok(data)
}

/// Try to extract one payload from a buffer that may hold partial data.
///
/// # Returns
///
/// - `Ok(Some((payload, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more data is needed (not an error condition)
/// - `Err` if data is malformed
pub fn try_deserialize_payload(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>, WireError> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let checksum = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    if (length as usize) < HEADER_SIZE {
        return Err(WireError::InvalidLength { length });
    }
    let payload_len = length as usize - HEADER_SIZE;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge { size: payload_len });
    }

    let total = length as usize;
    if data.len() < total {
        return Ok(None);
    }

    let payload = &data[HEADER_SIZE..total];
    let computed = compute_checksum(payload);
    if computed != checksum {
        return Err(WireError::ChecksumMismatch {
            expected: checksum,
            actual: computed,
        });
    }

    Ok(Some((payload.to_vec(), total)))
}

/// Encode a frame into its wire bytes.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    let payload = serde_json::to_vec(frame).map_err(|e| WireError::Malformed(e.to_string()))?;
    serialize_payload(&payload)
}

/// Try to decode one frame from the front of `data`.
///
/// Same contract as [`try_deserialize_payload`], with the payload decoded.
pub fn try_decode_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, WireError> {
    match try_deserialize_payload(data)? {
        Some((payload, consumed)) => {
            let frame = serde_json::from_slice(&payload)
                .map_err(|e| WireError::Malformed(e.to_string()))?;
            Ok(Some((frame, consumed)))
        }
        None => Ok(None),
    }
}
