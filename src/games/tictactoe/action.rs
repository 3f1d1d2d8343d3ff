//! Moves and move rejection reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// A mark placed by a player. Moves are append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Who played it (the AI uses [`super::AI_USER_ID`]).
    pub player_id: UserId,
    /// Board position 0-8.
    pub position: usize,
    /// When the server accepted it.
    pub timestamp: DateTime<Utc>,
}

impl Move {
    /// Creates a new move.
    pub fn new(player_id: impl Into<UserId>, position: usize, timestamp: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.into(),
            position,
            timestamp,
        }
    }
}

/// Why a move was refused.
///
/// These are expected, client-correctable conditions and travel back to the
/// caller inside a result rather than as transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// No game with that id.
    #[display("Game not found")]
    GameNotFound,

    /// The game reached a terminal status.
    #[display("Game is already over")]
    GameOver,

    /// The caller is neither X nor O.
    #[display("You are not a player in this game")]
    NotAParticipant,

    /// The other player is to move.
    #[display("Not your turn")]
    NotYourTurn,

    /// Position outside 0-8.
    #[display("Invalid position")]
    InvalidPosition,

    /// Target cell already has a mark.
    #[display("Cell is already occupied")]
    CellOccupied,
}

impl std::error::Error for MoveError {}
