//! The persistence interface consumed by the game core.

use async_trait::async_trait;

use crate::db::{DbError, GameOutcome, MatchRecord, NewMatchRecord, PlayerStats};

/// Player statistics and match history storage.
///
/// The core treats every call as a durable, eventually consistent side
/// effect; nothing here is coupled transactionally to in-memory game state.
#[async_trait]
pub trait StatsStore: Send + Sync + std::fmt::Debug {
    /// Returns the stats row for `user_id`, creating an empty one if missing.
    async fn get_or_create(&self, user_id: &str, display_name: &str) -> Result<PlayerStats, DbError>;

    /// Returns the stats row for `user_id` if one exists.
    async fn get_by_user_id(&self, user_id: &str) -> Result<Option<PlayerStats>, DbError>;

    /// Replaces the stored display name.
    async fn update_display_name(&self, user_id: &str, display_name: &str) -> Result<(), DbError>;

    /// Increments the counter matching `outcome`.
    async fn record_outcome(&self, user_id: &str, outcome: GameOutcome) -> Result<(), DbError>;

    /// Players ordered by wins descending, then losses ascending.
    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<PlayerStats>, DbError>;

    /// Number of players with a stats row.
    async fn total_count(&self) -> Result<i64, DbError>;

    /// 1-based leaderboard rank, or 0 for unknown users.
    async fn rank(&self, user_id: &str) -> Result<i64, DbError>;

    /// Appends a finished match.
    async fn create_match(&self, record: NewMatchRecord) -> Result<MatchRecord, DbError>;

    /// Most recent matches involving `user_id` as either player.
    async fn matches_for_player(&self, user_id: &str, limit: i64) -> Result<Vec<MatchRecord>, DbError>;

    /// Increments the win counter.
    async fn record_win(&self, user_id: &str) -> Result<(), DbError> {
        self.record_outcome(user_id, GameOutcome::Win).await
    }

    /// Increments the loss counter.
    async fn record_loss(&self, user_id: &str) -> Result<(), DbError> {
        self.record_outcome(user_id, GameOutcome::Loss).await
    }

    /// Increments the draw counter.
    async fn record_draw(&self, user_id: &str) -> Result<(), DbError> {
        self.record_outcome(user_id, GameOutcome::Draw).await
    }
}
