//! Protocol definitions and constants

mod handshake;

pub use handshake::{
    accept_handshake, initiate_handshake, Request, Response, Status, DEFAULT_DECOY_DOMAIN,
    DEFAULT_DECOY_PORT, REQUEST_HEADER_LEN, RESPONSE_LEN, TLS_DISGUISE,
};

use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("Unsupported obfuscation code: {0}")]
    UnsupportedCode(u8),

    #[error("Handshake rejected: {0}")]
    Rejected(Status),

    #[error("Unknown status code: {0}")]
    UnknownStatus(u8),

    #[error("Code mismatch: sent {expected}, peer echoed {actual}")]
    CodeMismatch { expected: u8, actual: u8 },

    #[error("Decoy address too long: {0} bytes")]
    DecoyTooLong(usize),

    #[error("Handshake timed out")]
    Timeout,
}

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Handshake timeout in seconds
pub const HANDSHAKE_TIMEOUT: u64 = 30;

/// Idle timeout in seconds
pub const IDLE_TIMEOUT: u64 = 300;
