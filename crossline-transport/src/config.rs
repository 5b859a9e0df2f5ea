//! Configuration for the TCP transport.

use std::time::Duration;

/// Timeouts and buffer sizes used by both client and server.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Deadline a client attaches to a trigger call when none is given.
    /// `None` means the call carries no deadline.
    pub call_timeout: Option<Duration>,

    /// How long past a call's deadline the client keeps waiting for the
    /// server's own status before giving up locally.
    pub deadline_grace: Duration,

    /// How long the server waits for the opening call frame of a new
    /// connection.
    pub handshake_timeout: Duration,

    /// Bytes requested from the socket per read.
    pub read_chunk: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            call_timeout: Some(Duration::from_secs(30)),
            deadline_grace: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(5),
            read_chunk: 8 * 1024,
        }
    }
}

impl TransportConfig {
    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default trigger deadline.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the grace period added to a call deadline on the client.
    pub fn with_deadline_grace(mut self, grace: Duration) -> Self {
        self.deadline_grace = grace;
        self
    }

    /// Set how long the server waits for a connection's call frame.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the read chunk size. Clamped to at least one byte.
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Configuration for local tests: short timeouts everywhere.
    pub fn local_network() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            call_timeout: Some(Duration::from_secs(10)),
            deadline_grace: Duration::from_millis(200),
            handshake_timeout: Duration::from_secs(1),
            read_chunk: 4 * 1024,
        }
    }
}
