//! First-come-first-served pairing queue for human games.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

use crate::db::StatsStore;
use crate::games::tictactoe::{Game, UserId};
use crate::manager::GameManager;

/// Default pause between background pairing passes.
pub const DEFAULT_TICK: Duration = Duration::from_secs(2);

/// A user waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct QueueEntry {
    user_id: UserId,
    display_name: String,
    joined_at: DateTime<Utc>,
}

/// Receives queue notifications.
///
/// Called after the queue lock is released, in mutation order.
pub trait MatchmakingListener: Send + Sync + std::fmt::Debug {
    /// A queued user's 1-based position changed or was re-announced.
    fn queue_updated(&self, user_id: &str, position: usize, total: usize);

    /// Two queued users were paired into `game`.
    fn match_found(&self, game: &Game, player_ids: &[UserId; 2]);
}

/// Listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl MatchmakingListener for NoopListener {
    fn queue_updated(&self, _user_id: &str, _position: usize, _total: usize) {}

    fn match_found(&self, _game: &Game, _player_ids: &[UserId; 2]) {}
}

/// Successful result of joining the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Waiting at this 1-based position.
    Queued {
        /// Position in the queue.
        position: usize,
    },
    /// Paired during the join itself.
    Matched(Game),
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum QueueError {
    /// The user is already waiting.
    #[display("Already in queue")]
    AlreadyQueued {
        /// Current 1-based position.
        position: usize,
    },
    /// The user has an unfinished game.
    #[display("Already in a game")]
    AlreadyInGame,
}

impl std::error::Error for QueueError {}

/// A user's view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Whether the user is waiting.
    pub in_queue: bool,
    /// 1-based position, 0 when not queued.
    pub position: usize,
    /// Number of waiting users.
    pub total_in_queue: usize,
}

enum Notice {
    Position {
        user_id: UserId,
        position: usize,
        total: usize,
    },
    Matched {
        game: Game,
        players: [UserId; 2],
    },
}

/// Shared matchmaking queue. Clones share state.
#[derive(Debug, Clone)]
pub struct MatchmakingQueue {
    entries: Arc<Mutex<VecDeque<QueueEntry>>>,
    manager: GameManager,
    store: Arc<dyn StatsStore>,
    listener: Arc<dyn MatchmakingListener>,
}

impl MatchmakingQueue {
    /// Creates an empty queue feeding games into `manager`.
    #[instrument(skip_all)]
    pub fn new(
        manager: GameManager,
        store: Arc<dyn StatsStore>,
        listener: Arc<dyn MatchmakingListener>,
    ) -> Self {
        info!("Creating matchmaking queue");
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            manager,
            store,
            listener,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn position_in(entries: &VecDeque<QueueEntry>, user_id: &str) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.user_id == user_id)
            .map(|i| i + 1)
    }

    fn announce_positions(entries: &VecDeque<QueueEntry>, notices: &mut Vec<Notice>) {
        let total = entries.len();
        notices.extend(entries.iter().enumerate().map(|(i, e)| Notice::Position {
            user_id: e.user_id.clone(),
            position: i + 1,
            total,
        }));
    }

    /// Pairs the two longest-waiting entries until fewer than two remain.
    ///
    /// Entries whose user picked up a game while waiting are dropped.
    /// Must run under the queue lock; takes the manager lock per game.
    fn pair_locked(&self, entries: &mut VecDeque<QueueEntry>, notices: &mut Vec<Notice>) -> Vec<Game> {
        let mut games = Vec::new();
        loop {
            let Some(first) = self.pop_eligible(entries) else {
                break;
            };
            let Some(second) = self.pop_eligible(entries) else {
                entries.push_front(first);
                break;
            };
            let Some(game) = self.manager.try_create_pvp_game(
                &first.user_id,
                &first.display_name,
                &second.user_id,
                &second.display_name,
            ) else {
                // One of them started a game after the eligibility check.
                entries.push_front(second);
                entries.push_front(first);
                break;
            };
            info!(
                game_id = %game.game_id(),
                x = %first.user_id,
                o = %second.user_id,
                "Match found"
            );
            notices.push(Notice::Matched {
                game: game.clone(),
                players: [first.user_id, second.user_id],
            });
            games.push(game);
        }
        Self::announce_positions(entries, notices);
        games
    }

    /// Takes the front entry, discarding users who already hold a game.
    fn pop_eligible(&self, entries: &mut VecDeque<QueueEntry>) -> Option<QueueEntry> {
        while let Some(entry) = entries.pop_front() {
            if self.manager.player_current_game(&entry.user_id).is_none() {
                return Some(entry);
            }
            warn!(user_id = %entry.user_id, "Dropping queued player who is already in a game");
        }
        None
    }

    fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Position {
                    user_id,
                    position,
                    total,
                } => self.listener.queue_updated(&user_id, position, total),
                Notice::Matched { game, players } => self.listener.match_found(&game, &players),
            }
        }
    }

    /// Adds the caller to the tail and tries to pair immediately.
    ///
    /// # Errors
    ///
    /// [`QueueError::AlreadyQueued`] with the current position, or
    /// [`QueueError::AlreadyInGame`] if the caller has an unfinished game.
    #[instrument(skip(self))]
    pub async fn join_queue(&self, user_id: &str, display_name: &str) -> Result<JoinOutcome, QueueError> {
        self.check_eligible(user_id)?;

        if let Err(e) = self.store.get_or_create(user_id, display_name).await {
            warn!(error = %e, "Failed to ensure stats row before queueing");
        }

        let mut notices = Vec::new();
        let outcome = {
            let mut entries = self.lock();
            // Re-check: the store call above yielded.
            if let Some(position) = Self::position_in(&entries, user_id) {
                return Err(QueueError::AlreadyQueued { position });
            }
            if self.manager.player_current_game(user_id).is_some() {
                return Err(QueueError::AlreadyInGame);
            }

            entries.push_back(QueueEntry {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                joined_at: Utc::now(),
            });
            let position = entries.len();
            info!(position, "Joined queue");
            Self::announce_positions(&entries, &mut notices);

            let games = if entries.len() >= 2 {
                self.pair_locked(&mut entries, &mut notices)
            } else {
                Vec::new()
            };
            match games.into_iter().find(|g| g.player(user_id).is_some()) {
                Some(game) => JoinOutcome::Matched(game),
                // Stale entries may have been dropped ahead of the caller.
                None => JoinOutcome::Queued {
                    position: Self::position_in(&entries, user_id).unwrap_or(position),
                },
            }
        };

        self.dispatch(notices);
        Ok(outcome)
    }

    fn check_eligible(&self, user_id: &str) -> Result<(), QueueError> {
        if let Some(position) = Self::position_in(&self.lock(), user_id) {
            debug!(position, "Already queued");
            return Err(QueueError::AlreadyQueued { position });
        }
        if self.manager.player_current_game(user_id).is_some() {
            debug!("Already in a game");
            return Err(QueueError::AlreadyInGame);
        }
        Ok(())
    }

    /// Removes the caller. False if they were not queued.
    #[instrument(skip(self))]
    pub fn leave_queue(&self, user_id: &str) -> bool {
        let mut notices = Vec::new();
        {
            let mut entries = self.lock();
            let Some(index) = entries.iter().position(|e| e.user_id == user_id) else {
                return false;
            };
            entries.remove(index);
            info!(remaining = entries.len(), "Left queue");
            Self::announce_positions(&entries, &mut notices);
        }
        self.dispatch(notices);
        true
    }

    /// The caller's position and the queue length.
    pub fn queue_status(&self, user_id: &str) -> QueueStatus {
        let entries = self.lock();
        let position = Self::position_in(&entries, user_id);
        QueueStatus {
            in_queue: position.is_some(),
            position: position.unwrap_or(0),
            total_in_queue: entries.len(),
        }
    }

    /// Runs one pairing pass and returns the games it created.
    #[instrument(skip(self))]
    pub fn process_queue(&self) -> Vec<Game> {
        let mut notices = Vec::new();
        let games = {
            let mut entries = self.lock();
            self.pair_locked(&mut entries, &mut notices)
        };
        if !games.is_empty() {
            debug!(matches = games.len(), "Pairing pass finished");
        }
        self.dispatch(notices);
        games
    }

    /// Spawns the background pairing loop.
    pub fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let queue = self.clone();
        info!(period_ms = period.as_millis(), "Starting matchmaking ticker");
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.process_queue();
            }
        })
    }
}
