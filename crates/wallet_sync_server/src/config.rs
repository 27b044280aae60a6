//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;
use wallet_sync_protocol::DEFAULT_MAX_FRAME_LEN;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 17001;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Connections above the limit are
    /// closed right after accept.
    pub max_connections: usize,
    /// How long a session may wait for client bytes.
    pub idle_timeout: Duration,
    /// Largest accepted frame payload.
    pub max_frame_len: usize,
    /// Bytes reserved in the receive buffer before each read.
    pub read_buffer_size: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1000,
            idle_timeout: Duration::from_secs(30),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_buffer_size: 8 * 1024,
        }
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the maximum frame payload length.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sets the read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}
