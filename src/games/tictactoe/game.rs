//! The game aggregate: board, players, status and history of one match.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::action::{Move, MoveError};
use super::rules::{WinningLine, check_winner, is_full};
use super::{BOARD_SIZE, Board, Cell, GameStatus, Mark};

/// Unique identifier for a game.
pub type GameId = String;

/// Opaque identifier for a user.
pub type UserId = String;

/// User id assigned to the computer opponent.
pub const AI_USER_ID: &str = "ai-player";

/// Display name of the computer opponent.
pub const AI_DISPLAY_NAME: &str = "Computer";

/// A seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player's unique ID.
    pub user_id: UserId,
    /// Name shown to other players.
    pub display_name: String,
    /// Which mark this player uses.
    pub marker: Mark,
}

impl Player {
    /// Creates a player seated with `marker`.
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>, marker: Mark) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            marker,
        }
    }

    /// True for the synthetic computer opponent.
    pub fn is_ai(&self) -> bool {
        self.user_id == AI_USER_ID
    }
}

/// What a single placement did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Turn passed to the other mark.
    Continue,
    /// The mover completed a line.
    Won(WinningLine),
    /// The board filled up.
    Draw,
}

impl Placement {
    /// True when the placement ended the game.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Placement::Continue)
    }
}

/// One match between X and O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct Game {
    game_id: GameId,
    player_x: Player,
    player_o: Option<Player>,
    board: Board,
    current_turn: Mark,
    status: GameStatus,
    moves: Vec<Move>,
    winner_id: Option<UserId>,
    winning_line: Option<[usize; 3]>,
    is_ai_game: bool,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    spectators: BTreeSet<UserId>,
}

impl Game {
    fn start(player_x: Player, player_o: Player, is_ai_game: bool, now: DateTime<Utc>) -> Self {
        Self {
            game_id: uuid::Uuid::new_v4().to_string(),
            player_x,
            player_o: Some(player_o),
            board: Board::new(),
            current_turn: Mark::X,
            status: GameStatus::InProgress,
            moves: Vec::new(),
            winner_id: None,
            winning_line: None,
            is_ai_game,
            created_at: now,
            finished_at: None,
            spectators: BTreeSet::new(),
        }
    }

    /// Human as X against the computer as O.
    #[instrument(skip(display_name))]
    pub fn new_ai(user_id: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        Self::start(
            Player::new(user_id, display_name, Mark::X),
            Player::new(AI_USER_ID, AI_DISPLAY_NAME, Mark::O),
            true,
            now,
        )
    }

    /// Two humans; the first is X.
    #[instrument(skip(x_name, o_name))]
    pub fn new_pvp(x_id: &str, x_name: &str, o_id: &str, o_name: &str, now: DateTime<Utc>) -> Self {
        Self::start(
            Player::new(x_id, x_name, Mark::X),
            Player::new(o_id, o_name, Mark::O),
            false,
            now,
        )
    }

    /// Looks up a seated player by user id.
    pub fn player(&self, user_id: &str) -> Option<&Player> {
        std::iter::once(&self.player_x)
            .chain(self.player_o.as_ref())
            .find(|p| p.user_id == user_id)
    }

    /// The player holding `mark`.
    pub fn player_with(&self, mark: Mark) -> Option<&Player> {
        match mark {
            Mark::X => Some(&self.player_x),
            Mark::O => self.player_o.as_ref(),
        }
    }

    /// Seated players that are not the computer.
    pub fn human_players(&self) -> impl Iterator<Item = &Player> {
        std::iter::once(&self.player_x)
            .chain(self.player_o.as_ref())
            .filter(|p| !p.is_ai())
    }

    /// True while the status is not terminal.
    pub fn is_active(&self) -> bool {
        !self.status.is_over()
    }

    /// The computer's mark in AI games.
    pub fn ai_mark(&self) -> Option<Mark> {
        self.is_ai_game.then_some(Mark::O)
    }

    /// Runs every move check except existence, in the order clients rely on.
    pub fn validate_move(&self, user_id: &str, position: usize) -> Result<Mark, MoveError> {
        if self.status != GameStatus::InProgress {
            return Err(MoveError::GameOver);
        }
        let mark = self
            .player(user_id)
            .map(|p| p.marker)
            .ok_or(MoveError::NotAParticipant)?;
        if mark != self.current_turn {
            return Err(MoveError::NotYourTurn);
        }
        if position >= BOARD_SIZE {
            return Err(MoveError::InvalidPosition);
        }
        if !self.board.is_empty(position) {
            return Err(MoveError::CellOccupied);
        }
        Ok(mark)
    }

    /// Validates and applies a move for `user_id`.
    #[instrument(skip(self), fields(game_id = %self.game_id))]
    pub fn play(
        &mut self,
        user_id: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<Placement, MoveError> {
        let mark = self.validate_move(user_id, position)?;
        Ok(self.place(user_id, mark, position, now))
    }

    /// Writes an already validated move and evaluates the end of game.
    fn place(&mut self, user_id: &str, mark: Mark, position: usize, now: DateTime<Utc>) -> Placement {
        self.board.cells_mut()[position] = Cell::from(mark);
        self.moves.push(Move::new(user_id, position, now));

        if let Some(win) = check_winner(&self.board) {
            self.status = GameStatus::won_by(mark);
            self.winner_id = Some(user_id.to_string());
            self.winning_line = Some(win.line);
            self.finished_at = Some(now);
            debug!(winner = %user_id, line = ?win.line, "Line completed");
            Placement::Won(win)
        } else if is_full(&self.board) {
            self.status = GameStatus::Draw;
            self.finished_at = Some(now);
            debug!("Board full, draw");
            Placement::Draw
        } else {
            self.current_turn = self.current_turn.opponent();
            Placement::Continue
        }
    }

    /// Applies the computer's reply at `position`.
    pub(crate) fn place_ai(&mut self, position: usize, now: DateTime<Utc>) -> Result<Placement, MoveError> {
        self.play(AI_USER_ID, position, now)
    }

    /// Ends the game in favour of the other participant.
    ///
    /// Returns `Ok(false)` without changes when the game is already over.
    #[instrument(skip(self), fields(game_id = %self.game_id))]
    pub fn abandon(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<bool, MoveError> {
        if self.status != GameStatus::InProgress {
            return Ok(false);
        }
        let forfeiter = self.player(user_id).ok_or(MoveError::NotAParticipant)?.marker;

        self.status = GameStatus::Abandoned;
        self.winner_id = self
            .player_with(forfeiter.opponent())
            .map(|p| p.user_id.clone());
        self.finished_at = Some(now);
        debug!(forfeiter = %user_id, winner = ?self.winner_id, "Game abandoned");
        Ok(true)
    }

    /// Adds a spectator; returns false if already watching.
    pub fn add_spectator(&mut self, user_id: &str) -> bool {
        self.spectators.insert(user_id.to_string())
    }

    /// Removes a spectator; returns false if they were not watching.
    pub fn remove_spectator(&mut self, user_id: &str) -> bool {
        self.spectators.remove(user_id)
    }
}
