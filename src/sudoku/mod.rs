//! The 4x4 grid universe behind the codec
//!
//! Provides:
//! - Enumeration of every valid 4x4 grid (the universe)
//! - A backtracking solver with multiplicity detection
//! - The catalog mapping byte values to unique 4-clue puzzles

mod catalog;
mod grid;
mod solver;

pub use catalog::{ByteCatalog, Catalog, GridIndex, PuzzleIndex, BYTE_VALUES};
pub use grid::{
    block_of, clue_subsets, enumerate_universe, Grid, Puzzle, CELLS, CLUES, MIN_DISTINCT_CLUES,
    SIZE,
};
pub use solver::{count_solutions, has_multiple_solutions, solve};

use thiserror::Error;

/// Grid and puzzle parsing errors
#[derive(Debug, Error)]
pub enum SudokuError {
    #[error("Expected 16 digits, got {0}")]
    InvalidLength(usize),

    #[error("Invalid digit: {0:?}")]
    InvalidDigit(char),

    #[error("Not a valid grid: {0}")]
    InvalidGrid(String),

    #[error("Not a valid puzzle: {0}")]
    InvalidPuzzle(String),
}

/// Catalog construction errors (fatal at startup)
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No unique puzzle available for byte {0}")]
    EmptyCandidates(u8),

    #[error("Universe holds only {0} grids, need 256")]
    UniverseTooSmall(usize),
}

/// Catalog shared by every unit test in the crate (built once)
#[cfg(test)]
pub(crate) fn shared_catalog() -> std::sync::Arc<Catalog> {
    use std::sync::{Arc, OnceLock};

    static CATALOG: OnceLock<Arc<Catalog>> = OnceLock::new();
    CATALOG
        .get_or_init(|| Arc::new(Catalog::build().expect("catalog builds")))
        .clone()
}
