//! Backtracking solver for 4x4 puzzles
//!
//! Blank cells are visited in row-major order and digits are tried from 1
//! to 4, so a uniquely solvable puzzle always yields the same grid.

use super::grid::{block_of, Grid, Puzzle, CELLS, SIZE};

/// Per-row, per-column and per-block "digit used" tables.
///
/// Lives on the stack of a single solve call.
struct Constraints {
    rows: [[bool; 5]; SIZE],
    cols: [[bool; 5]; SIZE],
    blocks: [[bool; 5]; SIZE],
}

impl Constraints {
    /// Seed the tables from the clues; `None` if two clues clash
    fn from_cells(cells: &[u8; CELLS]) -> Option<Self> {
        let mut constraints = Self {
            rows: [[false; 5]; SIZE],
            cols: [[false; 5]; SIZE],
            blocks: [[false; 5]; SIZE],
        };

        for (i, &digit) in cells.iter().enumerate() {
            if digit == 0 {
                continue;
            }
            if !constraints.allows(i, digit) {
                return None;
            }
            constraints.set(i, digit, true);
        }

        Some(constraints)
    }

    #[inline]
    fn allows(&self, idx: usize, digit: u8) -> bool {
        let (row, col) = (idx / SIZE, idx % SIZE);
        let d = digit as usize;
        !self.rows[row][d] && !self.cols[col][d] && !self.blocks[block_of(row, col)][d]
    }

    #[inline]
    fn set(&mut self, idx: usize, digit: u8, used: bool) {
        let (row, col) = (idx / SIZE, idx % SIZE);
        let d = digit as usize;
        self.rows[row][d] = used;
        self.cols[col][d] = used;
        self.blocks[block_of(row, col)][d] = used;
    }
}

/// Fill `board` from `idx` onwards, counting completions up to `limit`.
///
/// On return the first completion found is left in `first`.
fn search(
    board: &mut [u8; CELLS],
    constraints: &mut Constraints,
    idx: usize,
    count: &mut usize,
    limit: usize,
    first: &mut Option<[u8; CELLS]>,
) {
    let Some(next) = (idx..CELLS).find(|&i| board[i] == 0) else {
        *count += 1;
        if first.is_none() {
            *first = Some(*board);
        }
        return;
    };

    for digit in 1..=4u8 {
        if !constraints.allows(next, digit) {
            continue;
        }

        board[next] = digit;
        constraints.set(next, digit, true);

        search(board, constraints, next + 1, count, limit, first);

        board[next] = 0;
        constraints.set(next, digit, false);

        if *count >= limit {
            return;
        }
    }
}

/// Count completions of `puzzle`, stopping once `limit` have been found
pub fn count_solutions(puzzle: &Puzzle, limit: usize) -> usize {
    let mut board = *puzzle.cells();
    let Some(mut constraints) = Constraints::from_cells(&board) else {
        return 0;
    };

    let mut count = 0;
    let mut first = None;
    search(&mut board, &mut constraints, 0, &mut count, limit, &mut first);
    count
}

/// Whether `puzzle` admits a second, distinct completion.
///
/// Used to classify puzzles while the catalog is built.
pub fn has_multiple_solutions(puzzle: &Puzzle) -> bool {
    count_solutions(puzzle, 2) > 1
}

/// Solve `puzzle`, returning its first completion in search order
pub fn solve(puzzle: &Puzzle) -> Option<Grid> {
    let mut board = *puzzle.cells();
    let mut constraints = Constraints::from_cells(&board)?;

    let mut count = 0;
    let mut first = None;
    search(&mut board, &mut constraints, 0, &mut count, 1, &mut first);

    first.and_then(|cells| Grid::new(cells).ok())
}
