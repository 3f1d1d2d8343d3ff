//! Win detection logic for tic-tac-toe.

use super::super::{Board, Mark};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Winning patterns in priority order: rows, columns, diagonals.
pub const WIN_PATTERNS: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// A completed line and the mark that completed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningLine {
    /// The mark owning all three cells.
    pub mark: Mark,
    /// The three board positions.
    pub line: [usize; 3],
}

/// Checks if there is a winner on the board.
///
/// Only the first complete pattern in [`WIN_PATTERNS`] order is reported.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<WinningLine> {
    let cells = board.cells();
    WIN_PATTERNS.iter().find_map(|&[a, b, c]| {
        let mark = cells[a].mark()?;
        (cells[a] == cells[b] && cells[b] == cells[c]).then_some(WinningLine {
            mark,
            line: [a, b, c],
        })
    })
}
