//! Proxy protocol handling
//!
//! Provides the SOCKS5 gateway run by the remote relay on the decoded
//! client stream.

mod socks5;

pub use socks5::{negotiate, send_success, AddressType, Command, SOCKS_VERSION, SUCCESS_REPLY};

use crate::transport::{resolve, TransportError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid SOCKS version: {0}")]
    InvalidSocksVersion(u8),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(u8),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Proxy target address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address and port
    Ipv4([u8; 4], u16),
    /// IPv6 address and port
    Ipv6([u8; 16], u16),
    /// Domain name and port
    Domain(String, u16),
}

impl Address {
    /// Resolve to a socket address; domain names go through DNS, bounded
    /// by `limit`
    pub async fn resolve(&self, limit: Duration) -> Result<SocketAddr, ProxyError> {
        match self {
            Address::Ipv4(ip, port) => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(*ip)), *port)),
            Address::Ipv6(ip, port) => Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(*ip)), *port)),
            Address::Domain(domain, port) => Ok(resolve((domain.as_str(), *port), limit).await?),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Ipv4(ip, port) => write!(f, "{}:{}", Ipv4Addr::from(*ip), port),
            Address::Ipv6(ip, port) => write!(f, "[{}]:{}", Ipv6Addr::from(*ip), port),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}
