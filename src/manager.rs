//! Authoritative in-memory store of games and the move pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use crate::db::{GameOutcome, NewMatchRecord, RecordedMove, StatsStore};
use crate::games::tictactoe::{AiPlayer, Game, GameId, GameStatus, Mark, MoveError, Player, UserId};

/// Default time a finished game stays queryable.
pub const DEFAULT_FINISHED_GAME_TTL: Duration = Duration::from_secs(600);

/// Result of a move request.
///
/// Rejections carry the untouched game (absent only when the id is unknown).
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    /// Whether the move was applied.
    pub success: bool,
    /// Game state after the request.
    pub game: Option<Game>,
    /// Why the move was refused.
    pub error: Option<MoveError>,
}

impl MoveOutcome {
    fn applied(game: Game) -> Self {
        Self {
            success: true,
            game: Some(game),
            error: None,
        }
    }

    fn rejected(game: Option<Game>, error: MoveError) -> Self {
        Self {
            success: false,
            game,
            error: Some(error),
        }
    }
}

/// Result of a forfeit request.
#[derive(Debug, Clone, PartialEq)]
pub struct Forfeit {
    /// Game state after the request.
    pub game: Game,
    /// True only for the call that ended the game.
    pub ended: bool,
}

#[derive(Debug, Default)]
struct GameTable {
    games: HashMap<GameId, Game>,
    player_games: HashMap<UserId, GameId>,
}

impl GameTable {
    fn active_game_of(&self, user_id: &str) -> Option<&Game> {
        self.player_games
            .get(user_id)
            .and_then(|id| self.games.get(id))
            .filter(|g| g.is_active())
    }

    fn insert(&mut self, game: Game) {
        for player in game.human_players() {
            self.player_games
                .insert(player.user_id.clone(), game.game_id().clone());
        }
        self.games.insert(game.game_id().clone(), game);
    }

    /// Frees the human players of a finished game to start or queue again.
    fn release_players(&mut self, game: &Game) {
        for player in game.human_players() {
            if self.player_games.get(&player.user_id) == Some(game.game_id()) {
                self.player_games.remove(&player.user_id);
            }
        }
    }
}

/// Owns every game and the player to active game index.
///
/// Clones share state. Persistence runs after the table lock is released.
#[derive(Debug, Clone)]
pub struct GameManager {
    table: Arc<Mutex<GameTable>>,
    store: Arc<dyn StatsStore>,
    ai: AiPlayer,
    finished_ttl: Duration,
}

impl GameManager {
    /// Creates an empty manager.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn StatsStore>, ai: AiPlayer, finished_ttl: Duration) -> Self {
        info!("Creating game manager");
        Self {
            table: Arc::new(Mutex::new(GameTable::default())),
            store,
            ai,
            finished_ttl,
        }
    }

    /// Manager with the default opponent and retention.
    pub fn with_store(store: Arc<dyn StatsStore>) -> Self {
        Self::new(store, AiPlayer::default(), DEFAULT_FINISHED_GAME_TTL)
    }

    fn lock(&self) -> MutexGuard<'_, GameTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a game against the computer, or returns the caller's active game.
    #[instrument(skip(self))]
    pub fn create_ai_game(&self, user_id: &str, display_name: &str) -> Game {
        let mut table = self.lock();
        if let Some(existing) = table.active_game_of(user_id) {
            debug!(game_id = %existing.game_id(), "Returning existing active game");
            return existing.clone();
        }

        let game = Game::new_ai(user_id, display_name, Utc::now());
        info!(game_id = %game.game_id(), "Created AI game");
        table.insert(game.clone());
        game
    }

    /// Starts a game between two humans; the first is X.
    #[instrument(skip(self, x_name, o_name))]
    pub fn create_pvp_game(&self, x_id: &str, x_name: &str, o_id: &str, o_name: &str) -> Game {
        let game = Game::new_pvp(x_id, x_name, o_id, o_name, Utc::now());
        info!(game_id = %game.game_id(), "Created PvP game");
        self.lock().insert(game.clone());
        game
    }

    /// Pairs two queued players unless either already holds an active game.
    ///
    /// The check and the insert share one lock, so a concurrent AI game
    /// creation cannot slip in between.
    pub(crate) fn try_create_pvp_game(&self, x_id: &str, x_name: &str, o_id: &str, o_name: &str) -> Option<Game> {
        let mut table = self.lock();
        if let Some(busy) = [x_id, o_id].into_iter().find(|id| table.active_game_of(id).is_some()) {
            debug!(user_id = busy, "Player already active, pairing skipped");
            return None;
        }
        let game = Game::new_pvp(x_id, x_name, o_id, o_name, Utc::now());
        info!(game_id = %game.game_id(), "Created PvP game");
        table.insert(game.clone());
        Some(game)
    }

    /// Snapshot of a game, finished or not.
    pub fn get_game(&self, game_id: &str) -> Option<Game> {
        self.lock().games.get(game_id).cloned()
    }

    /// The caller's in-progress game, if any.
    pub fn player_current_game(&self, user_id: &str) -> Option<Game> {
        self.lock().active_game_of(user_id).cloned()
    }

    /// Applies a human move and, in AI games, the computer's reply.
    ///
    /// Terminal transitions are persisted once, after the table is unlocked.
    #[instrument(skip(self))]
    pub async fn make_move(&self, game_id: &str, user_id: &str, position: usize) -> MoveOutcome {
        let now = Utc::now();
        let snapshot = {
            let mut table = self.lock();
            let Some(game) = table.games.get_mut(game_id) else {
                warn!("Move for unknown game");
                return MoveOutcome::rejected(None, MoveError::GameNotFound);
            };

            let placement = match game.play(user_id, position, now) {
                Ok(placement) => placement,
                Err(error) => {
                    warn!(%error, "Move rejected");
                    return MoveOutcome::rejected(Some(game.clone()), error);
                }
            };
            if !placement.is_terminal() {
                self.play_ai_reply(game, now);
            }

            let snapshot = game.clone();
            if !snapshot.is_active() {
                table.release_players(&snapshot);
            }
            snapshot
        };

        debug!(status = ?snapshot.status(), moves = snapshot.moves().len(), "Move applied");
        if !snapshot.is_active() {
            self.record_game_result(&snapshot).await;
        }
        MoveOutcome::applied(snapshot)
    }

    fn play_ai_reply(&self, game: &mut Game, now: DateTime<Utc>) {
        let Some(ai_mark) = game.ai_mark() else {
            return;
        };
        if !game.is_active() || *game.current_turn() != ai_mark {
            return;
        }

        match self.ai.choose_move(game.board(), ai_mark) {
            Some(position) => match game.place_ai(position, now) {
                Ok(placement) => debug!(position, ?placement, "AI replied"),
                Err(error) => warn!(position, %error, "AI produced an illegal move"),
            },
            None => warn!(game_id = %game.game_id(), "AI found no move on an open board"),
        }
    }

    /// Ends an in-progress game in favour of the other player.
    ///
    /// Calling it again on a finished game returns the game unchanged with
    /// `ended` false and records nothing.
    ///
    /// # Errors
    ///
    /// [`MoveError::GameNotFound`] for unknown ids and
    /// [`MoveError::NotAParticipant`] when the caller is not seated.
    #[instrument(skip(self))]
    pub async fn forfeit(&self, game_id: &str, user_id: &str) -> Result<Forfeit, MoveError> {
        let (snapshot, ended) = {
            let mut table = self.lock();
            let game = table.games.get_mut(game_id).ok_or(MoveError::GameNotFound)?;
            let ended = game.abandon(user_id, Utc::now())?;
            let snapshot = game.clone();
            if ended {
                table.release_players(&snapshot);
            }
            (snapshot, ended)
        };

        if ended {
            info!(winner = ?snapshot.winner_id(), "Game forfeited");
            self.record_game_result(&snapshot).await;
        } else {
            debug!(status = ?snapshot.status(), "Forfeit on finished game ignored");
        }
        Ok(Forfeit {
            game: snapshot,
            ended,
        })
    }

    /// Starts a fresh AI game after a finished one.
    ///
    /// Only finished AI games qualify; PvP rematches are not supported.
    ///
    /// # Errors
    ///
    /// [`MoveError::GameNotFound`] for unknown ids and
    /// [`MoveError::NotAParticipant`] when the caller did not play it.
    #[instrument(skip(self, display_name))]
    pub fn request_rematch(
        &self,
        game_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<Option<Game>, MoveError> {
        let old = self.get_game(game_id).ok_or(MoveError::GameNotFound)?;
        if old.player(user_id).is_none() {
            return Err(MoveError::NotAParticipant);
        }
        if old.is_active() || !*old.is_ai_game() {
            debug!(status = ?old.status(), ai = old.is_ai_game(), "Rematch refused");
            return Ok(None);
        }
        Ok(Some(self.create_ai_game(user_id, display_name)))
    }

    /// In-progress human games, oldest first. AI games are not listed.
    pub fn active_games(&self) -> Vec<Game> {
        let mut games: Vec<Game> = self
            .lock()
            .games
            .values()
            .filter(|g| *g.status() == GameStatus::InProgress && !*g.is_ai_game())
            .cloned()
            .collect();
        games.sort_by_key(|g| *g.created_at());
        games
    }

    /// Adds a spectator. False if the game does not exist.
    #[instrument(skip(self))]
    pub fn add_spectator(&self, game_id: &str, user_id: &str) -> bool {
        match self.lock().games.get_mut(game_id) {
            Some(game) => {
                game.add_spectator(user_id);
                true
            }
            None => false,
        }
    }

    /// Removes a spectator. False if the game does not exist.
    #[instrument(skip(self))]
    pub fn remove_spectator(&self, game_id: &str, user_id: &str) -> bool {
        match self.lock().games.get_mut(game_id) {
            Some(game) => {
                game.remove_spectator(user_id);
                true
            }
            None => false,
        }
    }

    /// Users watching a game.
    pub fn spectators(&self, game_id: &str) -> Vec<UserId> {
        self.lock()
            .games
            .get(game_id)
            .map(|g| g.spectators().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops finished games older than the retention window.
    ///
    /// Returns the ids of the evicted games.
    #[instrument(skip(self))]
    pub fn prune_finished(&self, now: DateTime<Utc>) -> Vec<GameId> {
        let ttl = TimeDelta::from_std(self.finished_ttl).unwrap_or(TimeDelta::MAX);
        let mut table = self.lock();
        let expired: Vec<GameId> = table
            .games
            .values()
            .filter(|g| g.finished_at().is_some_and(|done| now - done >= ttl))
            .map(|g| g.game_id().clone())
            .collect();
        for game_id in &expired {
            table.games.remove(game_id);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = table.games.len(), "Pruned finished games");
        }
        expired
    }

    /// Persists match history and counters for a finished game.
    ///
    /// Failures are logged; in-memory state is never rolled back.
    #[instrument(skip(self, game), fields(game_id = %game.game_id(), status = ?game.status()))]
    async fn record_game_result(&self, game: &Game) {
        let moves: Vec<RecordedMove> = game
            .moves()
            .iter()
            .map(|m| RecordedMove::new(m.player_id.clone(), i32::try_from(m.position).unwrap_or(-1)))
            .collect();
        let record = NewMatchRecord::new(
            game.player_x().user_id.clone(),
            game.player_o().as_ref().map(|p| p.user_id.clone()),
            game.winner_id().clone(),
            *game.is_ai_game(),
            &moves,
        );
        match record {
            Ok(record) => {
                if let Err(e) = self.store.create_match(record).await {
                    warn!(error = %e, "Failed to record match history");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode match history"),
        }

        let x_outcome = match game.status() {
            GameStatus::XWins => GameOutcome::Win,
            GameStatus::OWins => GameOutcome::Loss,
            GameStatus::Draw => GameOutcome::Draw,
            _ => {
                debug!("No counters for this result");
                return;
            }
        };

        let humans: Vec<Player> = game.human_players().cloned().collect();
        for player in humans {
            let outcome = match player.marker {
                Mark::X => x_outcome,
                Mark::O => x_outcome.mirrored(),
            };
            self.record_outcome(&player, outcome).await;
        }
    }

    async fn record_outcome(&self, player: &Player, outcome: GameOutcome) {
        if let Err(e) = self
            .store
            .get_or_create(&player.user_id, &player.display_name)
            .await
        {
            warn!(user_id = %player.user_id, error = %e, "Failed to load player stats");
            return;
        }
        match self.store.record_outcome(&player.user_id, outcome).await {
            Ok(()) => debug!(user_id = %player.user_id, ?outcome, "Outcome recorded"),
            Err(e) => warn!(user_id = %player.user_id, ?outcome, error = %e, "Failed to record outcome"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStatsStore;

    fn manager() -> GameManager {
        GameManager::with_store(Arc::new(InMemoryStatsStore::new()))
    }

    #[test]
    fn test_create_ai_game_is_idempotent_while_active() {
        let manager = manager();
        let first = manager.create_ai_game("alice", "Alice");
        let second = manager.create_ai_game("alice", "Alice");
        assert_eq!(first.game_id(), second.game_id());
        assert!(*first.is_ai_game());
        assert_eq!(first.player_o().as_ref().map(|p| p.is_ai()), Some(true));
    }

    #[test]
    fn test_active_games_excludes_ai_games() {
        let manager = manager();
        manager.create_ai_game("alice", "Alice");
        let pvp = manager.create_pvp_game("bob", "Bob", "carol", "Carol");
        let listed: Vec<_> = manager.active_games().into_iter().map(|g| g.game_id().clone()).collect();
        assert_eq!(listed, vec![pvp.game_id().clone()]);
    }

    #[test]
    fn test_spectators_on_missing_game() {
        let manager = manager();
        assert!(!manager.add_spectator("missing", "dave"));
        assert!(!manager.remove_spectator("missing", "dave"));

        let game = manager.create_pvp_game("bob", "Bob", "carol", "Carol");
        assert!(manager.add_spectator(game.game_id(), "dave"));
        assert_eq!(manager.spectators(game.game_id()), vec!["dave".to_string()]);
        assert!(manager.remove_spectator(game.game_id(), "dave"));
        assert!(manager.spectators(game.game_id()).is_empty());
    }

    #[test]
    fn test_pairing_skips_players_with_active_games() {
        let manager = manager();
        let ai = manager.create_ai_game("alice", "Alice");
        assert!(manager.try_create_pvp_game("alice", "Alice", "bob", "Bob").is_none());
        assert!(manager.try_create_pvp_game("bob", "Bob", "alice", "Alice").is_none());
        assert_eq!(
            manager.player_current_game("alice").map(|g| g.game_id().clone()),
            Some(ai.game_id().clone())
        );
        assert!(manager.player_current_game("bob").is_none());

        let pvp = manager.try_create_pvp_game("bob", "Bob", "carol", "Carol").expect("both idle");
        assert_eq!(*pvp.status(), GameStatus::InProgress);
    }

    #[tokio::test]
    async fn test_prune_keeps_active_and_recent_games() {
        let manager = GameManager::new(
            Arc::new(InMemoryStatsStore::new()),
            AiPlayer::default(),
            Duration::from_secs(60),
        );
        let live = manager.create_pvp_game("a", "A", "b", "B");
        let done = manager.create_pvp_game("c", "C", "d", "D");
        manager.forfeit(done.game_id(), "c").await.unwrap();

        assert!(manager.prune_finished(Utc::now()).is_empty());
        let later = Utc::now() + TimeDelta::seconds(61);
        assert_eq!(manager.prune_finished(later), vec![done.game_id().clone()]);
        assert!(manager.get_game(live.game_id()).is_some());
        assert!(manager.get_game(done.game_id()).is_none());
    }

    #[tokio::test]
    async fn test_rematch_only_for_finished_ai_games() {
        let manager = manager();
        let game = manager.create_ai_game("alice", "Alice");
        assert_eq!(manager.request_rematch(game.game_id(), "alice", "Alice"), Ok(None));

        manager.forfeit(game.game_id(), "alice").await.unwrap();
        let rematch = manager
            .request_rematch(game.game_id(), "alice", "Alice")
            .unwrap()
            .unwrap();
        assert_ne!(rematch.game_id(), game.game_id());
        assert_eq!(*rematch.status(), GameStatus::InProgress);

        let pvp = manager.create_pvp_game("bob", "Bob", "carol", "Carol");
        manager.forfeit(pvp.game_id(), "bob").await.unwrap();
        assert_eq!(manager.request_rematch(pvp.game_id(), "carol", "Carol"), Ok(None));
        assert_eq!(
            manager.request_rematch(pvp.game_id(), "mallory", "M"),
            Err(MoveError::NotAParticipant)
        );
    }
}
