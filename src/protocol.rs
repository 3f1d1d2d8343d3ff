//! Wire shapes for requests, responses and pushed events.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, MatchRecord, PlayerStats, RecordedMove};
use crate::games::tictactoe::{Cell, Game, GameId, GameStatus, Mark, Move, Player, UserId};

/// A seated player as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// User id.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Mark held.
    pub marker: Mark,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            user_id: player.user_id.clone(),
            display_name: player.display_name.clone(),
            marker: player.marker,
        }
    }
}

/// A played move as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveView {
    /// Who played.
    pub player_id: UserId,
    /// Board position 0-8.
    pub position: usize,
    /// When it was accepted.
    pub timestamp: DateTime<Utc>,
}

impl From<&Move> for MoveView {
    fn from(mv: &Move) -> Self {
        Self {
            player_id: mv.player_id.clone(),
            position: mv.position,
            timestamp: mv.timestamp,
        }
    }
}

/// Full game state as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Game id.
    pub game_id: GameId,
    /// The X player.
    pub player_x: PlayerView,
    /// The O player.
    pub player_o: Option<PlayerView>,
    /// Row-major cells.
    pub board: Vec<Cell>,
    /// Mark to move.
    pub current_turn: Mark,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Move history.
    pub moves: Vec<MoveView>,
    /// Winner, if any.
    pub winner_id: Option<UserId>,
    /// Completed line, if any.
    pub winning_line: Option<[usize; 3]>,
    /// Whether O is the computer.
    pub is_ai_game: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Number of spectators.
    pub spectator_count: usize,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.game_id().clone(),
            player_x: game.player_x().into(),
            player_o: game.player_o().as_ref().map(PlayerView::from),
            board: game.board().cells().to_vec(),
            current_turn: *game.current_turn(),
            status: *game.status(),
            moves: game.moves().iter().map(MoveView::from).collect(),
            winner_id: game.winner_id().clone(),
            winning_line: *game.winning_line(),
            is_ai_game: *game.is_ai_game(),
            created_at: *game.created_at(),
            spectator_count: game.spectators().len(),
        }
    }
}

/// Body of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeMoveRequest {
    /// Board position 0-8; anything else is rejected as invalid.
    pub position: i64,
}

/// Move result. Rejections carry the unchanged game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeMoveResponse {
    /// Game after the request; absent for unknown games.
    pub game: Option<GameView>,
    /// Whether the move was applied.
    pub success: bool,
    /// Rejection reason, empty on success.
    pub error_message: String,
}

/// Response carrying a single game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResponse {
    /// The game.
    pub game: GameView,
}

/// Rematch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RematchResponse {
    /// Whether a new game was started.
    pub success: bool,
    /// The new game.
    pub new_game: Option<GameView>,
}

/// Queue join result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueResponse {
    /// Whether the caller is now queued or matched.
    pub success: bool,
    /// 1-based position; 0 when matched or not queued.
    pub position: usize,
    /// Refusal reason, empty on success.
    pub error_message: String,
    /// Game created during the join.
    pub game: Option<GameView>,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Whether the request had an effect.
    pub success: bool,
}

/// Watch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchGameResponse {
    /// Whether the caller is now watching.
    pub success: bool,
    /// Current game state.
    pub game: Option<GameView>,
}

/// Spectator listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGameSummary {
    /// Game id.
    pub game_id: GameId,
    /// X player's name.
    pub player_x_name: String,
    /// O player's name, empty when unseated.
    pub player_o_name: String,
    /// Moves played so far.
    pub move_count: usize,
    /// Lifecycle status.
    pub status: GameStatus,
}

impl From<&Game> for ActiveGameSummary {
    fn from(game: &Game) -> Self {
        Self {
            game_id: game.game_id().clone(),
            player_x_name: game.player_x().display_name.clone(),
            player_o_name: game
                .player_o()
                .as_ref()
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            move_count: game.moves().len(),
            status: *game.status(),
        }
    }
}

/// Spectator listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListActiveGamesResponse {
    /// Watchable games, oldest first.
    pub games: Vec<ActiveGameSummary>,
}

/// Player record as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsView {
    /// User id.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Games won.
    pub wins: i32,
    /// Games lost.
    pub losses: i32,
    /// Games drawn.
    pub draws: i32,
    /// Sum of the three counters.
    pub total_games: i32,
    /// First seen.
    pub created_at: NaiveDateTime,
    /// Last change.
    pub updated_at: NaiveDateTime,
}

impl From<&PlayerStats> for PlayerStatsView {
    fn from(stats: &PlayerStats) -> Self {
        Self {
            user_id: stats.user_id().clone(),
            display_name: stats.display_name().clone(),
            wins: *stats.wins(),
            losses: *stats.losses(),
            draws: *stats.draws(),
            total_games: stats.total_games(),
            created_at: *stats.created_at(),
            updated_at: *stats.updated_at(),
        }
    }
}

/// Query string of the leaderboard route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    /// Page size, default 20.
    pub limit: Option<i64>,
    /// Rows to skip, default 0.
    pub offset: Option<i64>,
}

/// One leaderboard page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    /// Players on this page.
    pub players: Vec<PlayerStatsView>,
    /// Players overall.
    pub total_count: i64,
}

/// A player's record and rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatsResponse {
    /// The record, absent for unknown players.
    pub stats: Option<PlayerStatsView>,
    /// 1-based rank, 0 when unknown.
    pub rank: i64,
}

/// Query string of the match history route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHistoryQuery {
    /// Maximum matches, default 20.
    pub limit: Option<i64>,
}

/// A finished match as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchHistoryEntry {
    /// Row id.
    pub id: i32,
    /// X player.
    pub player_x_id: String,
    /// O player.
    pub player_o_id: Option<String>,
    /// Winner, absent for draws.
    pub winner_id: Option<String>,
    /// Whether O was the computer.
    pub is_ai_game: bool,
    /// Moves in order.
    pub moves: Vec<RecordedMove>,
    /// When it was recorded.
    pub created_at: NaiveDateTime,
}

impl TryFrom<&MatchRecord> for MatchHistoryEntry {
    type Error = DbError;

    fn try_from(record: &MatchRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: *record.id(),
            player_x_id: record.player_x_id().clone(),
            player_o_id: record.player_o_id().clone(),
            winner_id: record.winner_id().clone(),
            is_ai_game: *record.is_ai_game(),
            moves: record.parse_moves()?,
            created_at: *record.created_at(),
        })
    }
}

/// A player's recent matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHistoryResponse {
    /// Newest first.
    pub matches: Vec<MatchHistoryEntry>,
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    /// A move was applied.
    GameUpdated {
        /// New state.
        game: GameView,
    },
    /// The game reached a terminal status.
    GameEnded {
        /// Final state.
        game: GameView,
    },
    /// State pushed to spectators.
    SpectatorUpdate {
        /// New state.
        game: GameView,
    },
    /// The queue paired the recipient.
    MatchFound {
        /// The new game.
        game: GameView,
    },
    /// The recipient's queue position.
    QueueUpdated {
        /// 1-based position.
        position: usize,
        /// Waiting users.
        #[serde(rename = "totalInQueue")]
        total_in_queue: usize,
    },
}

impl GameEvent {
    /// Name used as the SSE event type.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameUpdated { .. } => "gameUpdated",
            GameEvent::GameEnded { .. } => "gameEnded",
            GameEvent::SpectatorUpdate { .. } => "spectatorUpdate",
            GameEvent::MatchFound { .. } => "matchFound",
            GameEvent::QueueUpdated { .. } => "queueUpdated",
        }
    }
}
