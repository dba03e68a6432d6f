//! Puzzle-based traffic obfuscation
//!
//! Provides:
//! - The byte↔puzzle codec packing each payload byte into a 6-byte block
//! - Stream adapters applying the codec to an async byte stream
//!
//! Every payload byte is replaced by a randomly chosen 4-clue puzzle whose
//! unique completion identifies the byte, so repeated bytes never repeat on
//! the wire. This hides plaintext structure; it is not encryption.

mod cipher;
mod codec;

pub use cipher::{ObfsReader, ObfsWriter};
pub use codec::{pack_puzzle, unpack_puzzle, Codec};

use crate::sudoku::{Grid, Puzzle};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Bytes on the wire per payload byte
pub const BLOCK_SIZE: usize = 6;

/// Obfuscation errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Ambiguous puzzle block: {0}")]
    AmbiguousPuzzle(Puzzle),

    #[error("Puzzle has no completion: {0}")]
    Unsolvable(Puzzle),

    #[error("Grid not indexed: {0}")]
    UnknownGrid(Grid),

    #[error("Grid ordinal {0} is outside the byte range")]
    OrdinalOutOfRange(usize),

    #[error("Input length {0} is not a multiple of the block size")]
    InvalidLength(usize),

    #[error("Stream ended inside a block ({0} trailing bytes)")]
    TruncatedBlock(usize),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Unsupported obfuscation code: {0}")]
    UnsupportedCode(u8),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether this error concerns a single rejected block rather than the
    /// stream as a whole
    pub fn is_block_rejection(&self) -> bool {
        matches!(
            self,
            CodecError::AmbiguousPuzzle(_)
                | CodecError::Unsolvable(_)
                | CodecError::UnknownGrid(_)
                | CodecError::OrdinalOutOfRange(_)
        )
    }
}

/// Polarity of the one-marker bitmap.
///
/// Original digit 1 and a blank cell both pack to `0`; the marker bit
/// tells them apart, and the code decides which marker value means "1".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ObfuscationCode {
    /// Marker is 0 on original-1 cells, 1 everywhere else
    Inverted = 0x00,
    /// Marker is 1 on original-1 cells, 0 everywhere else
    #[default]
    Direct = 0x01,
}

impl ObfuscationCode {
    /// Marker bit for a cell holding `digit`
    #[inline]
    pub fn marker_for(self, digit: u8) -> u8 {
        let is_one = digit == 1;
        match self {
            ObfuscationCode::Direct => is_one as u8,
            ObfuscationCode::Inverted => (!is_one) as u8,
        }
    }

    /// Whether `marker` flags an original-1 cell
    #[inline]
    pub fn marks_one(self, marker: u8) -> bool {
        match self {
            ObfuscationCode::Direct => marker == 1,
            ObfuscationCode::Inverted => marker == 0,
        }
    }
}

impl TryFrom<u8> for ObfuscationCode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ObfuscationCode::Inverted),
            0x01 => Ok(ObfuscationCode::Direct),
            _ => Err(CodecError::UnsupportedCode(value)),
        }
    }
}

impl From<ObfuscationCode> for u8 {
    fn from(code: ObfuscationCode) -> Self {
        code as u8
    }
}

/// What a decoding stream does with a block that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguousBlockPolicy {
    /// Fail the read; the connection is torn down
    #[default]
    Abort,
    /// Drop the block and keep decoding
    Skip,
}

/// Which relay directions carry obfuscated bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionPolicy {
    /// Client application → destination
    pub upstream: bool,
    /// Destination → client application
    pub downstream: bool,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self {
            upstream: true,
            downstream: true,
        }
    }
}

impl DirectionPolicy {
    /// Obfuscate only client → destination traffic
    pub fn upstream_only() -> Self {
        Self {
            upstream: true,
            downstream: false,
        }
    }
}
