//! Transport layer
//!
//! Provides:
//! - Chunk sources and sinks over plain or obfuscated TCP halves
//! - The pump moving bytes between two connections
//! - Shared traffic counters and their reporters
//! - Outbound dialing with timeouts, keep-alive and socket protection

mod protect;
mod pump;
mod stats;
mod stream;
mod tcp;

pub use protect::{NoProtection, SocketProtector};
#[cfg(unix)]
pub use protect::UnixSocketProtector;
pub use pump::{pump, relay, Activity, RelaySummary, PUMP_CHUNK_SIZE};
pub use stats::{spawn_reporter, Direction, LogSink, StatsSink, TrafficSnapshot, TrafficStats};
#[cfg(unix)]
pub use stats::UnixSocketSink;
pub use stream::{sink, source, BoxedSink, BoxedSource, PlainSink, PlainSource};
pub use tcp::{dial, resolve};

use crate::obfuscation::CodecError;
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Connection closed")]
    Closed,

    #[error("Timeout")]
    Timeout,

    #[error("Relay task failed: {0}")]
    Task(String),
}

/// Something the pump can read plain bytes from
#[async_trait]
pub trait ChunkSource: Send {
    /// Read up to `buf.len()` plain bytes; `Ok(0)` at end of stream
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Fill `buf` completely, failing with [`TransportError::Closed`] on EOF
    async fn read_exact_chunk(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_chunk(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            filled += n;
        }
        Ok(())
    }

    /// Blocks this source dropped instead of decoding
    fn skipped_blocks(&self) -> u64 {
        0
    }
}

/// Something the pump can write plain bytes to
#[async_trait]
pub trait ChunkSink: Send {
    /// Write all of `data`, returning the plain byte count accepted
    async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Signal end of stream to the peer
    async fn finish(&mut self) -> Result<(), TransportError>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Outbound connect timeout in seconds
    pub connect_timeout: u64,
    /// TCP keepalive interval in seconds (0 disables)
    pub keepalive_interval: u64,
    /// Longest a relay may go with no bytes moving either way, in seconds
    pub idle_timeout: u64,
    /// Deadline for handshake and SOCKS5 negotiation, in seconds
    pub handshake_timeout: u64,
}

impl TransportConfig {
    /// Outbound connect deadline, also used for DNS lookups
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Relay idle limit
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Deadline for the control handshake and SOCKS5 negotiation
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 5,
            keepalive_interval: 5,
            idle_timeout: crate::protocol::IDLE_TIMEOUT,
            handshake_timeout: crate::protocol::HANDSHAKE_TIMEOUT,
        }
    }
}
