//! Byte ↔ puzzle codec
//!
//! Block format (6 bytes):
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! | cells 0-3 | 4-7 | 8-11   | 12-15  | markers 0-7 | 8-15 |
//! +--------+--------+--------+--------+--------+--------+
//! ```
//! Each cell is stored as a 2-bit value (digit minus one, blanks as 0),
//! most significant cell first. The 16 marker bits, most significant bit
//! first, separate original 1s from blanks according to the active
//! [`ObfuscationCode`].

use super::{CodecError, ObfuscationCode, BLOCK_SIZE};
use crate::sudoku::{solve, Catalog, Puzzle, BYTE_VALUES, CELLS};
use rand::Rng;
use std::sync::Arc;

/// Pack a puzzle into its 6-byte wire block
pub fn pack_puzzle(puzzle: &Puzzle, code: ObfuscationCode) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];

    for (i, &digit) in puzzle.cells().iter().enumerate() {
        let value = digit.saturating_sub(1) & 0x03;
        block[i / 4] |= value << ((3 - i % 4) * 2);

        let marker = code.marker_for(digit);
        block[4 + i / 8] |= marker << (7 - i % 8);
    }

    block
}

/// Rebuild the puzzle carried by a 6-byte wire block.
///
/// Any 6 bytes unpack to some puzzle; whether it is meaningful is decided
/// by the catalog.
pub fn unpack_puzzle(block: &[u8; BLOCK_SIZE], code: ObfuscationCode) -> Puzzle {
    let mut cells = [0u8; CELLS];

    for (i, cell) in cells.iter_mut().enumerate() {
        let value = (block[i / 4] >> ((3 - i % 4) * 2)) & 0x03;
        let marker = (block[4 + i / 8] >> (7 - i % 8)) & 0x01;

        *cell = if value != 0 {
            value + 1
        } else if code.marks_one(marker) {
            1
        } else {
            0
        };
    }

    Puzzle::from_raw(cells)
}

/// Codec bound to a catalog and an obfuscation code
#[derive(Debug, Clone)]
pub struct Codec {
    catalog: Arc<Catalog>,
    code: ObfuscationCode,
}

impl Codec {
    /// Create a codec over a shared catalog
    pub fn new(catalog: Arc<Catalog>, code: ObfuscationCode) -> Self {
        Self { catalog, code }
    }

    /// Encode one byte using a caller-supplied random source
    pub fn encode_byte_with<R: Rng + ?Sized>(&self, byte: u8, rng: &mut R) -> [u8; BLOCK_SIZE] {
        let candidates = self.catalog.candidates(byte);
        let puzzle = &candidates[rng.gen_range(0..candidates.len())];
        pack_puzzle(puzzle, self.code)
    }

    /// Encode one byte with a fresh random puzzle choice
    pub fn encode_byte(&self, byte: u8) -> [u8; BLOCK_SIZE] {
        self.encode_byte_with(byte, &mut rand::thread_rng())
    }

    /// Append the encoding of `input` to `out` (exactly 6 bytes per input byte)
    pub fn encode_into(&self, input: &[u8], out: &mut Vec<u8>) {
        let mut rng = rand::thread_rng();
        out.reserve(input.len() * BLOCK_SIZE);
        for &byte in input {
            out.extend_from_slice(&self.encode_byte_with(byte, &mut rng));
        }
    }

    /// Encode `input` into a new buffer
    pub fn encode(&self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len() * BLOCK_SIZE);
        self.encode_into(input, &mut out);
        out
    }

    /// Decode one block back to its byte.
    ///
    /// The puzzle must be unique across the whole universe, and its grid
    /// must be one of the 256 byte grids.
    pub fn decode_block(&self, block: &[u8; BLOCK_SIZE]) -> Result<u8, CodecError> {
        let puzzle = unpack_puzzle(block, self.code);
        if !self.catalog.puzzles().contains(&puzzle) {
            return Err(CodecError::AmbiguousPuzzle(puzzle));
        }

        let grid = solve(&puzzle).ok_or(CodecError::Unsolvable(puzzle))?;
        let ordinal = self
            .catalog
            .grids()
            .ordinal(&grid)
            .ok_or(CodecError::UnknownGrid(grid))?;

        if ordinal >= BYTE_VALUES {
            return Err(CodecError::OrdinalOutOfRange(ordinal));
        }
        Ok(ordinal as u8)
    }

    /// Decode a whole number of blocks, failing on the first rejected one
    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        if input.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::InvalidLength(input.len()));
        }

        input
            .chunks_exact(BLOCK_SIZE)
            .map(|chunk| {
                let mut block = [0u8; BLOCK_SIZE];
                block.copy_from_slice(chunk);
                self.decode_block(&block)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sudoku::shared_catalog;

    const CODES: [ObfuscationCode; 2] = [ObfuscationCode::Inverted, ObfuscationCode::Direct];

    #[test]
    fn test_pack_layout() {
        // 1 2 3 0 / 3 0 0 0 / 0... ; transformed: 0 1 2 0 / 2 0 0 0
        let puzzle: Puzzle = "1230300000000000".parse().unwrap();

        let block = pack_puzzle(&puzzle, ObfuscationCode::Direct);
        assert_eq!(block, [0b0001_1000, 0b1000_0000, 0, 0, 0b1000_0000, 0]);

        let block = pack_puzzle(&puzzle, ObfuscationCode::Inverted);
        assert_eq!(block, [0b0001_1000, 0b1000_0000, 0, 0, 0b0111_1111, 0xFF]);
    }

    #[test]
    fn test_unpack_inverts_pack() {
        let puzzles = ["1230300000000000", "0004000300200001", "1000010000100001"];
        for code in CODES {
            for text in puzzles {
                let puzzle: Puzzle = text.parse().unwrap();
                assert_eq!(unpack_puzzle(&pack_puzzle(&puzzle, code), code), puzzle);
            }
        }
    }

    #[test]
    fn test_round_trip_every_candidate() {
        let catalog = shared_catalog();
        for code in CODES {
            let codec = Codec::new(catalog.clone(), code);
            for byte in 0..=255u8 {
                for puzzle in catalog.candidates(byte) {
                    let block = pack_puzzle(puzzle, code);
                    assert_eq!(codec.decode_block(&block).unwrap(), byte);
                }
            }
        }
    }

    #[test]
    fn test_encode_is_randomized() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Direct);
        let input = [0x41u8; 64];
        let encoded = codec.encode(&input);

        let distinct: std::collections::HashSet<&[u8]> = encoded.chunks(BLOCK_SIZE).collect();
        assert!(distinct.len() > 1);
        assert_eq!(codec.decode(&encoded).unwrap(), input);
        assert_eq!(codec.decode_block(&codec.encode_byte(0x41)).unwrap(), 0x41);
    }

    #[test]
    fn test_block_size_invariant() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Inverted);
        for len in [0usize, 1, 7, 300] {
            let input: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
            let encoded = codec.encode(&input);
            assert_eq!(encoded.len(), len * BLOCK_SIZE);

            let decoded = codec.decode(&encoded).unwrap();
            assert_eq!(decoded.len(), len);
            assert_eq!(decoded, input);
        }
    }

    #[test]
    fn test_reject_ambiguous_block() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Direct);

        // All blanks
        let err = codec.decode_block(&[0; BLOCK_SIZE]).unwrap_err();
        assert!(matches!(err, CodecError::AmbiguousPuzzle(_)));

        // Two clues only
        let puzzle: Puzzle = "1200000000000000".parse().unwrap();
        let err = codec.decode_block(&pack_puzzle(&puzzle, ObfuscationCode::Direct));
        assert!(matches!(err, Err(CodecError::AmbiguousPuzzle(_))));
    }

    #[test]
    fn test_reject_foreign_grid_ordinal() {
        let catalog = shared_catalog();
        let codec = Codec::new(catalog.clone(), ObfuscationCode::Direct);

        let foreign = catalog
            .puzzles()
            .puzzles()
            .find(|p| {
                let grid = solve(p).unwrap();
                catalog.grids().ordinal(&grid).unwrap() >= BYTE_VALUES
            })
            .expect("grids past 255 have unique puzzles");

        let block = pack_puzzle(foreign, ObfuscationCode::Direct);
        let err = codec.decode_block(&block).unwrap_err();
        assert!(matches!(err, CodecError::OrdinalOutOfRange(n) if n >= BYTE_VALUES));
    }

    #[test]
    fn test_wrong_code_does_not_decode_silently() {
        let catalog = shared_catalog();
        let encoder = Codec::new(catalog.clone(), ObfuscationCode::Direct);
        let decoder = Codec::new(catalog, ObfuscationCode::Inverted);

        let encoded = encoder.encode(b"hello world");
        assert_ne!(decoder.decode(&encoded).ok().as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn test_decode_rejects_partial_block() {
        let codec = Codec::new(shared_catalog(), ObfuscationCode::Direct);
        let encoded = codec.encode(b"ab");
        assert!(matches!(
            codec.decode(&encoded[..9]),
            Err(CodecError::InvalidLength(9))
        ));
    }
}
