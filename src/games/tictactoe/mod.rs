//! Tic-tac-toe board, rules, game state and computer opponent.

mod action;
mod ai;
mod game;
mod rules;
mod types;

pub use action::{Move, MoveError};
pub use ai::{AiPlayer, DEFAULT_MAX_DEPTH, DEFAULT_OPTIMAL_MOVE_PROBABILITY};
pub use game::{AI_DISPLAY_NAME, AI_USER_ID, Game, GameId, Placement, Player, UserId};
pub use rules::{WIN_PATTERNS, WinningLine, check_winner, is_draw, is_full, is_game_over};
pub use types::{BOARD_SIZE, Board, Cell, GameStatus, Mark};
