//! Control handshake preceding the obfuscated payload
//!
//! Request format (integers big-endian):
//! ```text
//! +----------+-----+------+----------+-----------+------------+
//! | DISGUISE | VER | CODE | DECOY LEN| DECOY PORT| DECOY ADDR |
//! +----------+-----+------+----------+-----------+------------+
//! |    3     |  1  |  1   |    1     |     2     |  Variable  |
//! +----------+-----+------+----------+-----------+------------+
//! ```
//!
//! Response format:
//! ```text
//! +----------+-----+--------+------+
//! | DISGUISE | VER | STATUS | CODE |
//! +----------+-----+--------+------+
//! |    3     |  1  |   1    |  1   |
//! +----------+-----+--------+------+
//! ```
//!
//! Both travel unencoded. The decoy address and port carry no meaning.

use super::{ProtocolError, PROTOCOL_VERSION};
use crate::obfuscation::ObfuscationCode;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Prefix resembling a TLS 1.2 handshake record header
pub const TLS_DISGUISE: [u8; 3] = [0x16, 0x03, 0x03];

/// Fixed part of a request
pub const REQUEST_HEADER_LEN: usize = 8;

/// Length of a response
pub const RESPONSE_LEN: usize = 6;

pub const DEFAULT_DECOY_DOMAIN: &str = "www.bing.com";
pub const DEFAULT_DECOY_PORT: u16 = 80;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    BadRequest = 0x01,
    Unauthorized = 0x02,
    Forbidden = 0x03,
    Timeout = 0x04,
    ServiceUnavailable = 0x05,
    HostUnreachable = 0x06,
    NetworkUnreachable = 0x07,
    InternalServerError = 0x08,
    NotUnique = 0x09,
}

impl TryFrom<u8> for Status {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Status::Ok,
            0x01 => Status::BadRequest,
            0x02 => Status::Unauthorized,
            0x03 => Status::Forbidden,
            0x04 => Status::Timeout,
            0x05 => Status::ServiceUnavailable,
            0x06 => Status::HostUnreachable,
            0x07 => Status::NetworkUnreachable,
            0x08 => Status::InternalServerError,
            0x09 => Status::NotUnique,
            _ => return Err(ProtocolError::UnknownStatus(value)),
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::BadRequest => "bad request",
            Status::Unauthorized => "unauthorized",
            Status::Forbidden => "forbidden",
            Status::Timeout => "timeout",
            Status::ServiceUnavailable => "service unavailable",
            Status::HostUnreachable => "host unreachable",
            Status::NetworkUnreachable => "network unreachable",
            Status::InternalServerError => "internal server error",
            Status::NotUnique => "not unique",
        };
        write!(f, "{} (0x{:02x})", name, *self as u8)
    }
}

/// Handshake request sent by the local relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub disguise: [u8; 3],
    pub version: u8,
    /// Raw code byte; validated by [`Request::negotiate`]
    pub code: u8,
    pub decoy_port: u16,
    pub decoy_addr: Vec<u8>,
}

impl Request {
    /// Build a request for `code`, naming `decoy_domain` as the disguise
    /// destination. The domain must fit in 255 bytes.
    pub fn new(
        code: ObfuscationCode,
        decoy_domain: &str,
        decoy_port: u16,
    ) -> Result<Self, ProtocolError> {
        if decoy_domain.len() > u8::MAX as usize {
            return Err(ProtocolError::DecoyTooLong(decoy_domain.len()));
        }

        Ok(Self {
            disguise: TLS_DISGUISE,
            version: PROTOCOL_VERSION,
            code: code.into(),
            decoy_port,
            decoy_addr: decoy_domain.as_bytes().to_vec(),
        })
    }

    /// Serialize to wire bytes, refusing a decoy address longer than its
    /// one-byte length field
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let decoy_len = u8::try_from(self.decoy_addr.len())
            .map_err(|_| ProtocolError::DecoyTooLong(self.decoy_addr.len()))?;

        let mut buf = Vec::with_capacity(REQUEST_HEADER_LEN + self.decoy_addr.len());
        buf.extend_from_slice(&self.disguise);
        buf.push(self.version);
        buf.push(self.code);
        buf.push(decoy_len);
        buf.extend_from_slice(&self.decoy_port.to_be_bytes());
        buf.extend_from_slice(&self.decoy_addr);
        Ok(buf)
    }

    /// Read a complete request without validating it
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut header = [0u8; REQUEST_HEADER_LEN];
        reader.read_exact(&mut header).await?;

        let mut decoy_addr = vec![0u8; header[5] as usize];
        reader.read_exact(&mut decoy_addr).await?;

        Ok(Self {
            disguise: [header[0], header[1], header[2]],
            version: header[3],
            code: header[4],
            decoy_port: u16::from_be_bytes([header[6], header[7]]),
            decoy_addr,
        })
    }

    /// Check version and code, returning the code to adopt
    pub fn negotiate(&self) -> Result<ObfuscationCode, ProtocolError> {
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: self.version,
            });
        }
        ObfuscationCode::try_from(self.code).map_err(|_| ProtocolError::UnsupportedCode(self.code))
    }
}

/// Handshake response sent by the remote relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub disguise: [u8; 3],
    pub version: u8,
    pub status: Status,
    pub code: u8,
}

impl Response {
    /// Response carrying `status` and the echoed code byte
    pub fn new(status: Status, code: u8) -> Self {
        Self {
            disguise: TLS_DISGUISE,
            version: PROTOCOL_VERSION,
            status,
            code,
        }
    }

    pub fn ok(code: ObfuscationCode) -> Self {
        Self::new(Status::Ok, code.into())
    }

    /// Serialize to the fixed 6-byte wire form
    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        [
            self.disguise[0],
            self.disguise[1],
            self.disguise[2],
            self.version,
            self.status as u8,
            self.code,
        ]
    }

    /// Read one response; an unknown status byte is an error
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut buf = [0u8; RESPONSE_LEN];
        reader.read_exact(&mut buf).await?;

        Ok(Self {
            disguise: [buf[0], buf[1], buf[2]],
            version: buf[3],
            status: Status::try_from(buf[4])?,
            code: buf[5],
        })
    }
}

/// Responder side: read the request, answer it, and return the adopted code.
///
/// An unknown version or code is answered with [`Status::BadRequest`] and
/// reported as an error; the caller must close without relaying.
pub async fn accept_handshake<S>(
    stream: &mut S,
) -> Result<(Request, ObfuscationCode), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = Request::read_from(stream).await?;
    debug!(
        "Handshake request: version {}, code {}, decoy {}:{}",
        request.version,
        request.code,
        String::from_utf8_lossy(&request.decoy_addr),
        request.decoy_port
    );

    match request.negotiate() {
        Ok(code) => {
            stream.write_all(&Response::ok(code).encode()).await?;
            stream.flush().await?;
            Ok((request, code))
        }
        Err(e) => {
            let response = Response::new(Status::BadRequest, request.code);
            stream.write_all(&response.encode()).await?;
            stream.flush().await?;
            Err(e)
        }
    }
}

/// Initiator side: send `request` and verify the response
pub async fn initiate_handshake<S>(
    stream: &mut S,
    request: &Request,
) -> Result<ObfuscationCode, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&request.encode()?).await?;
    stream.flush().await?;

    let response = Response::read_from(stream).await?;
    if response.version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: response.version,
        });
    }
    if response.status != Status::Ok {
        return Err(ProtocolError::Rejected(response.status));
    }
    if response.code != request.code {
        return Err(ProtocolError::CodeMismatch {
            expected: request.code,
            actual: response.code,
        });
    }

    ObfuscationCode::try_from(response.code)
        .map_err(|_| ProtocolError::UnsupportedCode(response.code))
}
