//! # Sudoku Tunnel
//!
//! A traffic-obfuscating TCP tunnel that disguises every payload byte as a
//! uniquely solvable 4x4 sudoku puzzle.
//!
//! ## Features
//!
//! - **Byte↔puzzle codec**: each byte becomes a random 4-clue puzzle whose
//!   only completion identifies it, packed into a 6-byte block
//! - **Randomized encoding**: the same byte rarely produces the same block
//! - **SOCKS5 gateway** on the remote relay, carried inside the tunnel
//! - **Traffic counters** reported to the log or a local Unix socket
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐      ┌─────────────┐  6-byte blocks  ┌──────────────┐      ┌─────────────┐
//! │   App    │─────▶│ local relay │────────────────▶│ remote relay │─────▶│ destination │
//! │ (SOCKS5) │◀─────│             │◀────────────────│ (SOCKS5 gw)  │◀─────│             │
//! └──────────┘      └─────────────┘                 └──────────────┘      └─────────────┘
//! ```

pub mod config;
pub mod obfuscation;
pub mod protocol;
pub mod proxy;
pub mod sudoku;
pub mod transport;
pub mod tunnel;

pub use config::Config;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] sudoku::CatalogError),

    #[error("Codec error: {0}")]
    Codec(#[from] obfuscation::CodecError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Configuration error: {0}")]
    Config(String),
}
