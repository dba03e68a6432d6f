//! Tunnel endpoints
//!
//! Provides:
//! - The local relay: plain SOCKS5 client traffic in, obfuscated traffic out
//! - The remote relay: handshake, SOCKS5 gateway, outbound dial and relay

mod local;
mod remote;

pub use local::LocalRelay;
pub use remote::RemoteRelay;

use crate::obfuscation::{AmbiguousBlockPolicy, DirectionPolicy};
use crate::protocol::ProtocolError;
use crate::proxy::ProxyError;
use crate::transport::{TransportConfig, TransportError};
use thiserror::Error;

/// Per-connection relay errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Negotiation timed out")]
    NegotiationTimeout,

    #[error("Relay is shutting down")]
    Shutdown,
}

/// Settings shared by both relay kinds
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub transport: TransportConfig,
    /// Which directions carry obfuscated bytes; both peers must agree
    pub directions: DirectionPolicy,
    pub on_ambiguous: AmbiguousBlockPolicy,
}
