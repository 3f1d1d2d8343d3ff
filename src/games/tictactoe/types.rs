//! Core domain types for tic-tac-toe.

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Number of squares on the board.
pub const BOARD_SIZE: usize = 9;

/// A player's marker. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Mark {
    /// Player X (goes first).
    X,
    /// Player O (goes second).
    O,
}

impl Mark {
    /// Returns the opponent's mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

/// A square on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    /// Nobody has played here yet.
    #[default]
    Empty,
    /// Occupied by X.
    X,
    /// Occupied by O.
    O,
}

impl Cell {
    /// Returns the mark occupying this cell, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::X => Some(Mark::X),
            Cell::O => Some(Mark::O),
        }
    }
}

impl From<Mark> for Cell {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::X => Cell::X,
            Mark::O => Cell::O,
        }
    }
}

/// 3x3 tic-tac-toe board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    /// Cells in row-major order (0-8).
    cells: [Cell; BOARD_SIZE],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from explicit cells.
    pub fn from_cells(cells: [Cell; BOARD_SIZE]) -> Self {
        Self { cells }
    }

    /// Gets the cell at the given position (0-8).
    pub fn get(&self, pos: usize) -> Option<Cell> {
        self.cells.get(pos).copied()
    }

    /// Sets the cell at the given position.
    pub fn set(&mut self, pos: usize, cell: Cell) -> Result<(), &'static str> {
        let slot = self.cells.get_mut(pos).ok_or("Position out of bounds")?;
        *slot = cell;
        Ok(())
    }

    /// Checks if a position is on the board and empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Cell::Empty))
    }

    /// Returns all cells.
    pub fn cells(&self) -> &[Cell; BOARD_SIZE] {
        &self.cells
    }

    /// Mutable access for scratch boards during search.
    pub(crate) fn cells_mut(&mut self) -> &mut [Cell; BOARD_SIZE] {
        &mut self.cells
    }

    /// Positions that are still empty, in ascending order.
    pub fn empty_positions(&self) -> Vec<usize> {
        (0..BOARD_SIZE).filter(|&pos| self.is_empty(pos)).collect()
    }

    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c != Cell::Empty).count()
    }
}

/// Lifecycle status of a game.
///
/// Declaration order matters: every variant from [`GameStatus::XWins`] on is
/// terminal, and [`GameStatus::is_over`] relies on the derived ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// Waiting for players.
    Waiting,
    /// Moves are being played.
    InProgress,
    /// X completed a line.
    XWins,
    /// O completed a line.
    OWins,
    /// Board filled with no line.
    Draw,
    /// A participant forfeited.
    Abandoned,
}

impl GameStatus {
    /// True for every terminal status.
    pub fn is_over(self) -> bool {
        self >= GameStatus::XWins
    }

    /// Status reached when `mark` completes a line.
    pub fn won_by(mark: Mark) -> Self {
        match mark {
            Mark::X => GameStatus::XWins,
            Mark::O => GameStatus::OWins,
        }
    }
}
