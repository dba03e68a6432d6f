//! 4x4 grids, 4-clue puzzles and the enumeration of the grid universe
//!
//! Cells are stored row-major as 16 digits. In a [`Puzzle`] a digit of `0`
//! marks a blank cell.

use super::SudokuError;
use std::fmt;
use std::str::FromStr;

/// Side length of a grid
pub const SIZE: usize = 4;

/// Number of cells in a grid
pub const CELLS: usize = SIZE * SIZE;

/// Number of clues kept in every puzzle
pub const CLUES: usize = 4;

/// Minimum number of distinct digits among the clues of an admissible puzzle
pub const MIN_DISTINCT_CLUES: usize = 3;

/// Index of the 2x2 block containing a cell
#[inline]
pub fn block_of(row: usize, col: usize) -> usize {
    (row / 2) * 2 + col / 2
}

/// A fully solved 4x4 grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grid([u8; CELLS]);

impl Grid {
    /// Build a grid, checking the row, column and block constraints
    pub fn new(cells: [u8; CELLS]) -> Result<Self, SudokuError> {
        if !Self::is_valid(&cells) {
            return Err(SudokuError::InvalidGrid(render(&cells)));
        }
        Ok(Self(cells))
    }

    /// Check that every row, column and 2x2 block holds 1-4 exactly once
    pub fn is_valid(cells: &[u8; CELLS]) -> bool {
        let mut rows = [0u8; SIZE];
        let mut cols = [0u8; SIZE];
        let mut blocks = [0u8; SIZE];

        for (i, &digit) in cells.iter().enumerate() {
            if !(1..=4).contains(&digit) {
                return false;
            }
            let bit = 1u8 << (digit - 1);
            let (row, col) = (i / SIZE, i % SIZE);
            let block = block_of(row, col);

            if rows[row] & bit != 0 || cols[col] & bit != 0 || blocks[block] & bit != 0 {
                return false;
            }
            rows[row] |= bit;
            cols[col] |= bit;
            blocks[block] |= bit;
        }

        true
    }

    /// Cell digits in row-major order
    pub fn cells(&self) -> &[u8; CELLS] {
        &self.0
    }

    /// Blank every cell except the given clue positions
    pub fn puzzle(&self, clues: &[usize; CLUES]) -> Puzzle {
        let mut cells = [0u8; CELLS];
        for &idx in clues {
            cells[idx] = self.0[idx];
        }
        Puzzle(cells)
    }

    /// Whether this grid agrees with every clue of `puzzle`
    pub fn completes(&self, puzzle: &Puzzle) -> bool {
        self.0
            .iter()
            .zip(puzzle.0.iter())
            .all(|(&g, &p)| p == 0 || g == p)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.0))
    }
}

impl FromStr for Grid {
    type Err = SudokuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(parse_digits(s)?)
    }
}

/// A partially filled grid; blanks are `0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Puzzle([u8; CELLS]);

impl Puzzle {
    /// Build a puzzle from raw cells; every cell must be in `0..=4`
    pub fn new(cells: [u8; CELLS]) -> Result<Self, SudokuError> {
        if cells.iter().any(|&d| d > 4) {
            return Err(SudokuError::InvalidPuzzle(render(&cells)));
        }
        Ok(Self(cells))
    }

    /// Wrap cells already known to be in range
    pub(crate) fn from_raw(cells: [u8; CELLS]) -> Self {
        debug_assert!(cells.iter().all(|&d| d <= 4));
        Self(cells)
    }

    /// Cell digits in row-major order
    pub fn cells(&self) -> &[u8; CELLS] {
        &self.0
    }

    /// Number of filled cells
    pub fn clue_count(&self) -> usize {
        self.0.iter().filter(|&&d| d != 0).count()
    }

    /// Number of distinct digits among the clues
    pub fn distinct_clues(&self) -> usize {
        let mask = self
            .0
            .iter()
            .filter(|&&d| d != 0)
            .fold(0u8, |acc, &d| acc | (1 << (d - 1)));
        mask.count_ones() as usize
    }

    /// Exactly four clues carrying at least three distinct digits
    pub fn is_admissible(&self) -> bool {
        self.clue_count() == CLUES && self.distinct_clues() >= MIN_DISTINCT_CLUES
    }
}

impl fmt::Display for Puzzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.0))
    }
}

impl FromStr for Puzzle {
    type Err = SudokuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(parse_digits(s)?)
    }
}

fn render(cells: &[u8; CELLS]) -> String {
    cells.iter().map(|&d| char::from(b'0' + d.min(9))).collect()
}

fn parse_digits(s: &str) -> Result<[u8; CELLS], SudokuError> {
    let bytes = s.as_bytes();
    if bytes.len() != CELLS {
        return Err(SudokuError::InvalidLength(bytes.len()));
    }

    let mut cells = [0u8; CELLS];
    for (cell, &b) in cells.iter_mut().zip(bytes) {
        if !b.is_ascii_digit() {
            return Err(SudokuError::InvalidDigit(char::from(b)));
        }
        *cell = b - b'0';
    }
    Ok(cells)
}

/// All orderings of the digits 1-4, in recursive-swap order
fn row_permutations() -> Vec<[u8; SIZE]> {
    fn permute(row: &mut [u8; SIZE], i: usize, out: &mut Vec<[u8; SIZE]>) {
        if i == SIZE - 1 {
            out.push(*row);
            return;
        }
        for j in i..SIZE {
            row.swap(i, j);
            permute(row, i + 1, out);
            row.swap(i, j);
        }
    }

    let mut out = Vec::with_capacity(24);
    permute(&mut [1, 2, 3, 4], 0, &mut out);
    out
}

/// Enumerate every valid grid.
///
/// Rows are taken from the permutations of 1-4 and combined in nested-loop
/// order, so the resulting order is fixed. Byte values are assigned by
/// position in this list.
pub fn enumerate_universe() -> Vec<Grid> {
    let rows = row_permutations();
    let mut grids = Vec::new();

    for r1 in &rows {
        for r2 in &rows {
            for r3 in &rows {
                for r4 in &rows {
                    let mut cells = [0u8; CELLS];
                    cells[0..4].copy_from_slice(r1);
                    cells[4..8].copy_from_slice(r2);
                    cells[8..12].copy_from_slice(r3);
                    cells[12..16].copy_from_slice(r4);
                    if Grid::is_valid(&cells) {
                        grids.push(Grid(cells));
                    }
                }
            }
        }
    }

    grids
}

/// Every 4-cell subset of the 16 positions, in lexicographic order
pub fn clue_subsets() -> Vec<[usize; CLUES]> {
    let mut subsets = Vec::with_capacity(1820);
    for a in 0..CELLS {
        for b in a + 1..CELLS {
            for c in b + 1..CELLS {
                for d in c + 1..CELLS {
                    subsets.push([a, b, c, d]);
                }
            }
        }
    }
    subsets
}
