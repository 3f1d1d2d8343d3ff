//! Database models and domain types.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{DbError, schema};

/// Win/loss/draw counters for one user.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters, Serialize)]
#[diesel(table_name = schema::player_stats)]
pub struct PlayerStats {
    pub(crate) id: i32,
    pub(crate) user_id: String,
    pub(crate) display_name: String,
    pub(crate) wins: i32,
    pub(crate) losses: i32,
    pub(crate) draws: i32,
    pub(crate) created_at: NaiveDateTime,
    pub(crate) updated_at: NaiveDateTime,
}

impl PlayerStats {
    /// Games counted towards the record.
    pub fn total_games(&self) -> i32 {
        self.wins + self.losses + self.draws
    }

    /// Leaderboard ordering: more wins first, then fewer losses.
    pub fn ranking_key(&self) -> (std::cmp::Reverse<i32>, i32) {
        (std::cmp::Reverse(self.wins), self.losses)
    }

    /// True if `self` ranks strictly above `other`.
    pub fn outranks(&self, other: &PlayerStats) -> bool {
        self.ranking_key() < other.ranking_key()
    }
}

/// Insertable stats row for a first-time player.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::player_stats)]
pub struct NewPlayerStats {
    user_id: String,
    display_name: String,
}

/// A single move as stored in match history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct RecordedMove {
    /// Who played.
    pub player_id: String,
    /// Board position 0-8.
    pub position: i32,
}

/// Finished match row.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Getters, Serialize)]
#[diesel(table_name = schema::match_history)]
pub struct MatchRecord {
    pub(crate) id: i32,
    pub(crate) player_x_id: String,
    pub(crate) player_o_id: Option<String>,
    pub(crate) winner_id: Option<String>,
    pub(crate) is_ai_game: bool,
    pub(crate) moves: String,
    pub(crate) created_at: NaiveDateTime,
}

impl MatchRecord {
    /// Decodes the stored JSON move list.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the column does not hold a valid move list.
    #[instrument(skip(self), fields(match_id = self.id))]
    pub fn parse_moves(&self) -> Result<Vec<RecordedMove>, DbError> {
        Ok(serde_json::from_str(&self.moves)?)
    }
}

/// Insertable match history row.
#[derive(Debug, Clone, Insertable, Getters)]
#[diesel(table_name = schema::match_history)]
pub struct NewMatchRecord {
    player_x_id: String,
    player_o_id: Option<String>,
    winner_id: Option<String>,
    is_ai_game: bool,
    moves: String,
}

impl NewMatchRecord {
    /// Builds a row, encoding the moves as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the moves cannot be encoded.
    #[instrument(skip(moves), fields(moves = moves.len()))]
    pub fn new(
        player_x_id: String,
        player_o_id: Option<String>,
        winner_id: Option<String>,
        is_ai_game: bool,
        moves: &[RecordedMove],
    ) -> Result<Self, DbError> {
        Ok(Self {
            player_x_id,
            player_o_id,
            winner_id,
            is_ai_game,
            moves: serde_json::to_string(moves)?,
        })
    }
}

/// Game outcome from one user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameOutcome {
    /// User won the game.
    Win,
    /// User lost the game.
    Loss,
    /// Game ended in a draw.
    Draw,
}

impl GameOutcome {
    /// The outcome seen by the opponent.
    pub fn mirrored(self) -> Self {
        match self {
            Self::Win => Self::Loss,
            Self::Loss => Self::Win,
            Self::Draw => Self::Draw,
        }
    }
}
