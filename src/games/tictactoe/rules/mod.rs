//! Game rules for tic-tac-toe.
//!
//! Pure functions for evaluating a board. Rules are separated from board
//! storage so the game aggregate and the AI search share one implementation.

pub mod draw;
pub mod win;

pub use draw::{is_draw, is_full};
pub use win::{WIN_PATTERNS, WinningLine, check_winner};

use super::GameStatus;

/// True once `status` is terminal.
pub fn is_game_over(status: GameStatus) -> bool {
    status.is_over()
}
