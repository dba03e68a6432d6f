//! Lookup tables between byte values, puzzles and grids
//!
//! All tables are built once by [`Catalog::build`] and never mutated
//! afterwards, so a `Catalog` behind an `Arc` can be read from any number
//! of connection tasks without locking.

use super::grid::{clue_subsets, enumerate_universe, Grid, Puzzle, CLUES};
use super::solver::has_multiple_solutions;
use super::CatalogError;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Number of representable payload byte values
pub const BYTE_VALUES: usize = 256;

/// Per-byte candidate puzzles.
///
/// Byte `b` owns the grid at ordinal `b` in the universe; its candidates
/// are the admissible 4-clue puzzles of that grid with a unique completion.
#[derive(Debug)]
pub struct ByteCatalog {
    entries: Vec<Vec<Puzzle>>,
}

impl ByteCatalog {
    /// Build candidate lists for the first [`BYTE_VALUES`] grids
    pub fn build(universe: &[Grid], subsets: &[[usize; CLUES]]) -> Result<Self, CatalogError> {
        if universe.len() < BYTE_VALUES {
            return Err(CatalogError::UniverseTooSmall(universe.len()));
        }

        let mut entries = Vec::with_capacity(BYTE_VALUES);
        for (byte, grid) in universe.iter().take(BYTE_VALUES).enumerate() {
            let candidates: Vec<Puzzle> = subsets
                .iter()
                .map(|clues| grid.puzzle(clues))
                .filter(|puzzle| puzzle.is_admissible() && !has_multiple_solutions(puzzle))
                .collect();

            if candidates.is_empty() {
                return Err(CatalogError::EmptyCandidates(byte as u8));
            }
            entries.push(candidates);
        }

        Ok(Self { entries })
    }

    /// Candidate puzzles for `byte`; never empty
    pub fn candidates(&self, byte: u8) -> &[Puzzle] {
        &self.entries[byte as usize]
    }

    /// Total number of candidates over all byte values
    pub fn total(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }
}

/// Puzzles whose completion is unique across the whole universe.
///
/// Decoded blocks are only trusted when their puzzle is in this index.
#[derive(Debug)]
pub struct PuzzleIndex {
    ids: HashMap<Puzzle, u32>,
}

impl PuzzleIndex {
    /// Tally every admissible puzzle of every grid and keep those produced
    /// by exactly one (grid, clue subset) pair
    pub fn build(universe: &[Grid], subsets: &[[usize; CLUES]]) -> Self {
        let capacity = universe.len() * subsets.len();
        let mut tally: HashMap<Puzzle, u32> = HashMap::with_capacity(capacity);
        let mut order = Vec::with_capacity(capacity);

        for grid in universe {
            for clues in subsets {
                let puzzle = grid.puzzle(clues);
                if !puzzle.is_admissible() {
                    continue;
                }
                let count = tally.entry(puzzle).or_insert(0);
                if *count == 0 {
                    order.push(puzzle);
                }
                *count += 1;
            }
        }

        let mut ids = HashMap::new();
        for puzzle in order {
            if tally.get(&puzzle) == Some(&1) {
                let id = ids.len() as u32;
                ids.insert(puzzle, id);
            }
        }

        Self { ids }
    }

    /// Whether `puzzle` is globally unique
    pub fn contains(&self, puzzle: &Puzzle) -> bool {
        self.ids.contains_key(puzzle)
    }

    /// Synthetic identity of a globally unique puzzle
    pub fn id(&self, puzzle: &Puzzle) -> Option<u32> {
        self.ids.get(puzzle).copied()
    }

    /// Number of indexed puzzles
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over indexed puzzles (in no particular order)
    pub fn puzzles(&self) -> impl Iterator<Item = &Puzzle> {
        self.ids.keys()
    }
}

/// Bidirectional map between grids and their enumeration ordinals
#[derive(Debug)]
pub struct GridIndex {
    grids: Vec<Grid>,
    ordinals: HashMap<Grid, usize>,
}

impl GridIndex {
    /// Record every grid with its position in `universe`
    pub fn build(universe: &[Grid]) -> Self {
        let ordinals = universe
            .iter()
            .enumerate()
            .map(|(ordinal, grid)| (*grid, ordinal))
            .collect();

        Self {
            grids: universe.to_vec(),
            ordinals,
        }
    }

    /// Ordinal of `grid`
    pub fn ordinal(&self, grid: &Grid) -> Option<usize> {
        self.ordinals.get(grid).copied()
    }

    /// Grid at `ordinal`
    pub fn grid(&self, ordinal: usize) -> Option<&Grid> {
        self.grids.get(ordinal)
    }

    /// Number of grids
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    /// Whether no grid is indexed
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

/// Codec context: every table the byte/puzzle codec needs
#[derive(Debug)]
pub struct Catalog {
    bytes: ByteCatalog,
    puzzles: PuzzleIndex,
    grids: GridIndex,
}

impl Catalog {
    /// Enumerate the universe and build all lookup tables.
    ///
    /// Fails if some byte value ends up without a candidate puzzle.
    pub fn build() -> Result<Self, CatalogError> {
        let started = Instant::now();

        let universe = enumerate_universe();
        let subsets = clue_subsets();
        debug!(
            "Enumerated {} grids and {} clue subsets",
            universe.len(),
            subsets.len()
        );

        let grids = GridIndex::build(&universe);
        let puzzles = PuzzleIndex::build(&universe, &subsets);
        let bytes = ByteCatalog::build(&universe, &subsets)?;

        info!(
            "Puzzle catalog ready: {} grids, {} unique puzzles, {} byte candidates ({:?})",
            grids.len(),
            puzzles.len(),
            bytes.total(),
            started.elapsed()
        );

        Ok(Self {
            bytes,
            puzzles,
            grids,
        })
    }

    /// Globally unique puzzles
    pub fn puzzles(&self) -> &PuzzleIndex {
        &self.puzzles
    }

    /// Grid ordinals
    pub fn grids(&self) -> &GridIndex {
        &self.grids
    }

    /// Candidate puzzles for `byte`
    pub fn candidates(&self, byte: u8) -> &[Puzzle] {
        self.bytes.candidates(byte)
    }
}
