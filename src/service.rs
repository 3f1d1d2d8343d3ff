//! Request handling on top of the game core.
//!
//! [`ArenaService`] resolves identities, drives the [`GameManager`] and
//! [`MatchmakingQueue`], and scopes pushed events through the
//! [`GameClientTracker`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use derive_more::Display;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use crate::config::ArenaConfig;
use crate::db::{DbError, StatsStore};
use crate::directory::{NicknameDirectory, StaticDirectory, resolve_nickname};
use crate::games::tictactoe::{AiPlayer, Game, MoveError, UserId};
use crate::hub::ClientHub;
use crate::manager::GameManager;
use crate::matchmaking::{JoinOutcome, MatchmakingListener, MatchmakingQueue, QueueError, QueueStatus};
use crate::protocol::{
    ActiveGameSummary, GameEvent, GameView, JoinQueueResponse, LeaderboardResponse,
    ListActiveGamesResponse, MakeMoveResponse, MatchHistoryEntry, MatchHistoryResponse,
    PlayerStatsResponse, PlayerStatsView, RematchResponse, SuccessResponse, WatchGameResponse,
};
use crate::tracker::GameClientTracker;

/// Leaderboard page size when none is given.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Request failures that cross into the transport layer.
#[derive(Debug, Clone, Display)]
pub enum ServiceError {
    /// The request carried no caller identity.
    #[display("Missing caller identity")]
    MissingIdentity,
    /// The referenced game does not exist.
    #[display("Game not found")]
    NotFound,
    /// The caller is not seated in the game.
    #[display("You are not a player in this game")]
    NotParticipant,
    /// The stats store failed.
    #[display("{}", _0)]
    Storage(DbError),
}

impl std::error::Error for ServiceError {}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        Self::Storage(err)
    }
}

impl From<MoveError> for ServiceError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::NotAParticipant => Self::NotParticipant,
            _ => Self::NotFound,
        }
    }
}

/// Forwards queue notifications to connected clients.
#[derive(Debug, Clone)]
struct QueueNotifier {
    hub: ClientHub,
    tracker: GameClientTracker,
}

impl MatchmakingListener for QueueNotifier {
    fn queue_updated(&self, user_id: &str, position: usize, total: usize) {
        let event = GameEvent::QueueUpdated {
            position,
            total_in_queue: total,
        };
        self.hub.deliver(&[user_id.to_string()], &event);
    }

    fn match_found(&self, game: &Game, player_ids: &[UserId; 2]) {
        let event = GameEvent::MatchFound {
            game: GameView::from(game),
        };
        for player_id in player_ids {
            self.tracker.add_player(game.game_id(), player_id);
        }
        self.hub.deliver(player_ids, &event);
    }
}

/// The arena's request handlers. Clones share state.
#[derive(Debug, Clone)]
pub struct ArenaService {
    manager: GameManager,
    queue: MatchmakingQueue,
    tracker: GameClientTracker,
    hub: ClientHub,
    store: Arc<dyn StatsStore>,
    directory: Arc<dyn NicknameDirectory>,
}

impl ArenaService {
    /// Wires the core components together.
    #[instrument(skip_all)]
    pub fn new(
        store: Arc<dyn StatsStore>,
        directory: Arc<dyn NicknameDirectory>,
        ai: AiPlayer,
        finished_ttl: Duration,
    ) -> Self {
        let hub = ClientHub::new();
        let tracker = GameClientTracker::new();
        let manager = GameManager::new(store.clone(), ai, finished_ttl);
        let notifier = QueueNotifier {
            hub: hub.clone(),
            tracker: tracker.clone(),
        };
        let queue = MatchmakingQueue::new(manager.clone(), store.clone(), Arc::new(notifier));
        info!("Arena service ready");
        Self {
            manager,
            queue,
            tracker,
            hub,
            store,
            directory,
        }
    }

    /// Builds the service described by `config` on top of `store`.
    pub fn from_config(config: &ArenaConfig, store: Arc<dyn StatsStore>) -> Self {
        let directory = StaticDirectory::new(config.directory().nicknames().clone());
        Self::new(
            store,
            Arc::new(directory),
            config.ai().player(),
            config.retention().finished_game_ttl(),
        )
    }

    /// The game store.
    pub fn manager(&self) -> &GameManager {
        &self.manager
    }

    /// The pairing queue.
    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    /// The broadcast scope tracker.
    pub fn tracker(&self) -> &GameClientTracker {
        &self.tracker
    }

    /// Opens an event stream for the caller.
    pub fn connect(&self, user_id: &str) -> UnboundedReceiver<GameEvent> {
        self.hub.connect(user_id)
    }

    /// Closes the caller's event streams.
    pub fn disconnect(&self, user_id: &str) {
        self.hub.disconnect(user_id);
    }

    /// Resolves the caller's name and makes sure their stats row exists.
    async fn enroll(&self, user_id: &str) -> String {
        let nickname = resolve_nickname(self.directory.as_ref(), user_id).await;
        match self.store.get_or_create(user_id, &nickname).await {
            Ok(stats) if *stats.display_name() != nickname => {
                if let Err(e) = self.store.update_display_name(user_id, &nickname).await {
                    warn!(user_id, error = %e, "Failed to refresh display name");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(user_id, error = %e, "Failed to load player stats"),
        }
        nickname
    }

    /// Everyone registered for the game except `caller`.
    fn audience(&self, game_id: &str, caller: &str) -> Vec<UserId> {
        self.tracker
            .game_clients(game_id)
            .into_iter()
            .filter(|user| user != caller)
            .collect()
    }

    /// Pushes a new game state to players and spectators, then the end
    /// event and scope cleanup once the game is over.
    fn publish(&self, game: &Game, caller: &str, moved: bool) {
        let audience = self.audience(game.game_id(), caller);
        let view = GameView::from(game);

        if moved {
            let (watchers, players): (Vec<UserId>, Vec<UserId>) = audience
                .iter()
                .cloned()
                .partition(|user| game.spectators().contains(user));
            self.hub.deliver(&players, &GameEvent::GameUpdated { game: view.clone() });
            self.hub
                .deliver(&watchers, &GameEvent::SpectatorUpdate { game: view.clone() });
        }

        if !game.is_active() {
            self.hub.deliver(&audience, &GameEvent::GameEnded { game: view });
            self.tracker.cleanup_game(game.game_id());
            debug!(game_id = %game.game_id(), "Game scope closed");
        }
    }

    /// Starts a game against the computer.
    #[instrument(skip(self))]
    pub async fn create_ai_game(&self, caller: &str) -> GameView {
        let nickname = self.enroll(caller).await;
        let game = self.manager.create_ai_game(caller, &nickname);
        // After the game exists, so a racing join is either refused or removed here.
        self.queue.leave_queue(caller);
        self.tracker.add_player(game.game_id(), caller);
        GameView::from(&game)
    }

    /// Plays a move for the caller.
    #[instrument(skip(self))]
    pub async fn make_move(&self, game_id: &str, caller: &str, position: i64) -> MakeMoveResponse {
        // Negative or huge positions fall through to the range check.
        let position = usize::try_from(position).unwrap_or(usize::MAX);
        let outcome = self.manager.make_move(game_id, caller, position).await;

        match (outcome.success, outcome.game) {
            (true, Some(game)) => {
                self.publish(&game, caller, true);
                MakeMoveResponse {
                    game: Some(GameView::from(&game)),
                    success: true,
                    error_message: String::new(),
                }
            }
            (_, game) => MakeMoveResponse {
                game: game.as_ref().map(GameView::from),
                success: false,
                error_message: outcome
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
        }
    }

    /// Current state of a game.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] for unknown ids.
    pub fn get_game(&self, game_id: &str) -> Result<GameView, ServiceError> {
        self.manager
            .get_game(game_id)
            .map(|g| GameView::from(&g))
            .ok_or(ServiceError::NotFound)
    }

    /// Concedes the caller's game.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] or [`ServiceError::NotParticipant`].
    #[instrument(skip(self))]
    pub async fn forfeit(&self, game_id: &str, caller: &str) -> Result<GameView, ServiceError> {
        let forfeit = self.manager.forfeit(game_id, caller).await?;
        if forfeit.ended {
            self.publish(&forfeit.game, caller, false);
        }
        Ok(GameView::from(&forfeit.game))
    }

    /// Starts a new AI game after a finished one.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotParticipant`] when the caller did not play it.
    #[instrument(skip(self))]
    pub async fn request_rematch(&self, game_id: &str, caller: &str) -> Result<RematchResponse, ServiceError> {
        let refused = RematchResponse {
            success: false,
            new_game: None,
        };
        let Some(old) = self.manager.get_game(game_id) else {
            return Ok(refused);
        };
        if old.player(caller).is_none() {
            return Err(ServiceError::NotParticipant);
        }
        if old.is_active() || !*old.is_ai_game() {
            return Ok(refused);
        }

        let nickname = self.enroll(caller).await;
        match self.manager.request_rematch(game_id, caller, &nickname) {
            Ok(Some(game)) => {
                self.queue.leave_queue(caller);
                self.tracker.add_player(game.game_id(), caller);
                Ok(RematchResponse {
                    success: true,
                    new_game: Some(GameView::from(&game)),
                })
            }
            // Evicted between the check and the rematch.
            Ok(None) | Err(MoveError::GameNotFound) => Ok(refused),
            Err(e) => Err(e.into()),
        }
    }

    /// Queues the caller for a human opponent.
    #[instrument(skip(self))]
    pub async fn join_queue(&self, caller: &str) -> JoinQueueResponse {
        let nickname = self.enroll(caller).await;
        match self.queue.join_queue(caller, &nickname).await {
            Ok(JoinOutcome::Matched(game)) => JoinQueueResponse {
                success: true,
                position: 0,
                error_message: String::new(),
                game: Some(GameView::from(&game)),
            },
            Ok(JoinOutcome::Queued { position }) => JoinQueueResponse {
                success: true,
                position,
                error_message: String::new(),
                game: None,
            },
            Err(e) => {
                let position = match e {
                    QueueError::AlreadyQueued { position } => position,
                    QueueError::AlreadyInGame => 0,
                };
                JoinQueueResponse {
                    success: false,
                    position,
                    error_message: e.to_string(),
                    game: None,
                }
            }
        }
    }

    /// Removes the caller from the queue.
    pub fn leave_queue(&self, caller: &str) -> SuccessResponse {
        SuccessResponse {
            success: self.queue.leave_queue(caller),
        }
    }

    /// The caller's place in the queue.
    pub fn queue_status(&self, caller: &str) -> QueueStatus {
        self.queue.queue_status(caller)
    }

    /// Starts spectating a game.
    #[instrument(skip(self))]
    pub fn watch_game(&self, game_id: &str, caller: &str) -> WatchGameResponse {
        if !self.manager.add_spectator(game_id, caller) {
            return WatchGameResponse {
                success: false,
                game: None,
            };
        }
        self.tracker.add_spectator(game_id, caller);
        WatchGameResponse {
            success: true,
            game: self.manager.get_game(game_id).as_ref().map(GameView::from),
        }
    }

    /// Stops spectating a game.
    #[instrument(skip(self))]
    pub fn stop_watching(&self, game_id: &str, caller: &str) -> SuccessResponse {
        self.manager.remove_spectator(game_id, caller);
        self.tracker.remove_client(caller);
        SuccessResponse { success: true }
    }

    /// Games open to spectators.
    pub fn list_active_games(&self) -> ListActiveGamesResponse {
        ListActiveGamesResponse {
            games: self
                .manager
                .active_games()
                .iter()
                .map(ActiveGameSummary::from)
                .collect(),
        }
    }

    /// One page of standings.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Storage`] if the store fails.
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, limit: Option<i64>, offset: Option<i64>) -> Result<LeaderboardResponse, ServiceError> {
        let limit = page_size(limit);
        let offset = offset.unwrap_or(0).max(0);
        let players = self.store.leaderboard(limit, offset).await?;
        let total_count = self.store.total_count().await?;
        Ok(LeaderboardResponse {
            players: players.iter().map(PlayerStatsView::from).collect(),
            total_count,
        })
    }

    /// A player's record and rank.
    ///
    /// Callers asking about themselves get an empty record created.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Storage`] if the store fails.
    #[instrument(skip(self))]
    pub async fn player_stats(&self, user_id: &str, caller: &str) -> Result<PlayerStatsResponse, ServiceError> {
        let mut stats = self.store.get_by_user_id(user_id).await?;
        if stats.is_none() && user_id == caller {
            let nickname = resolve_nickname(self.directory.as_ref(), caller).await;
            stats = Some(self.store.get_or_create(caller, &nickname).await?);
        }
        let Some(stats) = stats else {
            return Ok(PlayerStatsResponse { stats: None, rank: 0 });
        };
        let rank = self.store.rank(user_id).await?;
        Ok(PlayerStatsResponse {
            stats: Some(PlayerStatsView::from(&stats)),
            rank,
        })
    }

    /// A player's recent matches, newest first.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Storage`] if the store fails or a row is corrupt.
    #[instrument(skip(self))]
    pub async fn match_history(&self, user_id: &str, limit: Option<i64>) -> Result<MatchHistoryResponse, ServiceError> {
        let records = self.store.matches_for_player(user_id, page_size(limit)).await?;
        let matches = records
            .iter()
            .map(MatchHistoryEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MatchHistoryResponse { matches })
    }

    /// Evicts expired finished games and forgets their clients.
    ///
    /// Returns the number of games evicted.
    #[instrument(skip(self))]
    pub fn sweep_finished(&self, now: DateTime<Utc>) -> usize {
        let evicted = self.manager.prune_finished(now);
        for game_id in &evicted {
            self.tracker.cleanup_game(game_id);
        }
        evicted.len()
    }

    /// Spawns the matchmaking ticker and the finished game sweeper.
    pub fn spawn_background(&self, tick: Duration, sweep_every: Duration) -> Vec<JoinHandle<()>> {
        let service = self.clone();
        let sweeper = tokio::spawn(async move {
            let mut ticker = interval(sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                service.sweep_finished(Utc::now());
            }
        });
        vec![self.queue.spawn_ticker(tick), sweeper]
    }
}

fn page_size(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if n > 0 => n.min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}
