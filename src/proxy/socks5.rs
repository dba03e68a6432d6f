//! Minimal SOCKS5 gateway (RFC 1928, no authentication, CONNECT only)
//!
//! Runs on chunk endpoints so the same code serves plain and decoded
//! streams. Bytes the client pipelined behind its request stay in the
//! source for the relay.

use super::{Address, ProxyError};
use crate::transport::{ChunkSink, ChunkSource};
use tracing::debug;

/// SOCKS5 version
pub const SOCKS_VERSION: u8 = 0x05;

/// Method selection reply: no authentication required
const NO_AUTH_REPLY: [u8; 2] = [SOCKS_VERSION, 0x00];

/// Success reply with a placeholder IPv4 bound address
pub const SUCCESS_REPLY: [u8; 10] = [SOCKS_VERSION, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

/// SOCKS5 commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = ProxyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            0x03 => Ok(Command::UdpAssociate),
            _ => Err(ProxyError::UnsupportedCommand(value)),
        }
    }
}

/// Address types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl TryFrom<u8> for AddressType {
    type Error = ProxyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AddressType::Ipv4),
            0x03 => Ok(AddressType::Domain),
            0x04 => Ok(AddressType::Ipv6),
            _ => Err(ProxyError::UnsupportedAddressType(value)),
        }
    }
}

async fn read_port(source: &mut dyn ChunkSource) -> Result<u16, ProxyError> {
    let mut port = [0u8; 2];
    source.read_exact_chunk(&mut port).await?;
    Ok(u16::from_be_bytes(port))
}

/// Run method selection and read the CONNECT request.
///
/// Anything other than CONNECT is an error; the caller closes the
/// connection without a reply.
pub async fn negotiate(
    source: &mut dyn ChunkSource,
    sink: &mut dyn ChunkSink,
) -> Result<Address, ProxyError> {
    // Greeting: VER NMETHODS METHODS...
    let mut greeting = [0u8; 2];
    source.read_exact_chunk(&mut greeting).await?;
    if greeting[0] != SOCKS_VERSION {
        return Err(ProxyError::InvalidSocksVersion(greeting[0]));
    }
    let nmethods = greeting[1] as usize;
    if nmethods == 0 {
        return Err(ProxyError::MalformedRequest("no methods offered".into()));
    }
    let mut methods = vec![0u8; nmethods];
    source.read_exact_chunk(&mut methods).await?;

    // No authentication, whatever was offered
    sink.write_chunk(&NO_AUTH_REPLY).await?;

    // Request: VER CMD RSV ATYP
    let mut head = [0u8; 4];
    source.read_exact_chunk(&mut head).await?;
    if head[0] != SOCKS_VERSION {
        return Err(ProxyError::InvalidSocksVersion(head[0]));
    }

    let command = Command::try_from(head[1])?;
    if command != Command::Connect {
        return Err(ProxyError::UnsupportedCommand(command as u8));
    }

    let address = match AddressType::try_from(head[3])? {
        AddressType::Ipv4 => {
            let mut ip = [0u8; 4];
            source.read_exact_chunk(&mut ip).await?;
            Address::Ipv4(ip, read_port(source).await?)
        }
        AddressType::Domain => {
            let mut len = [0u8; 1];
            source.read_exact_chunk(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            source.read_exact_chunk(&mut name).await?;
            let domain = String::from_utf8(name)
                .map_err(|_| ProxyError::InvalidAddress("domain is not UTF-8".into()))?;
            if domain.is_empty() {
                return Err(ProxyError::InvalidAddress("empty domain".into()));
            }
            Address::Domain(domain, read_port(source).await?)
        }
        AddressType::Ipv6 => {
            let mut ip = [0u8; 16];
            source.read_exact_chunk(&mut ip).await?;
            Address::Ipv6(ip, read_port(source).await?)
        }
    };

    debug!("SOCKS5 CONNECT to {}", address);
    Ok(address)
}

/// Tell the client its destination is connected
pub async fn send_success(sink: &mut dyn ChunkSink) -> Result<(), ProxyError> {
    sink.write_chunk(&SUCCESS_REPLY).await?;
    Ok(())
}
