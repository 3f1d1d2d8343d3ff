//! Process-local [`StatsStore`] used for ephemeral servers and tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::db::{DbError, GameOutcome, MatchRecord, NewMatchRecord, PlayerStats, StatsStore};

#[derive(Debug, Default)]
struct Tables {
    players: Vec<PlayerStats>,
    matches: Vec<MatchRecord>,
}

/// Stats store that keeps every row in memory.
///
/// Ordering and ranking match [`crate::StatsRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatsStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStatsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded match, oldest first.
    pub fn all_matches(&self) -> Vec<MatchRecord> {
        self.with(|t| t.matches.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }

    fn sorted_players(tables: &Tables) -> Vec<PlayerStats> {
        let mut players = tables.players.clone();
        players.sort_by_key(|p| (p.ranking_key(), p.id));
        players
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    #[instrument(skip(self))]
    async fn get_or_create(&self, user_id: &str, display_name: &str) -> Result<PlayerStats, DbError> {
        Ok(self.with(|t| {
            if let Some(existing) = t.players.iter().find(|p| p.user_id == user_id) {
                return existing.clone();
            }
            let now = Utc::now().naive_utc();
            let stats = PlayerStats {
                id: i32::try_from(t.players.len()).unwrap_or(i32::MAX - 1) + 1,
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                wins: 0,
                losses: 0,
                draws: 0,
                created_at: now,
                updated_at: now,
            };
            debug!(stats_id = stats.id, "Player stats created");
            t.players.push(stats.clone());
            stats
        }))
    }

    async fn get_by_user_id(&self, user_id: &str) -> Result<Option<PlayerStats>, DbError> {
        Ok(self.with(|t| t.players.iter().find(|p| p.user_id == user_id).cloned()))
    }

    async fn update_display_name(&self, user_id: &str, display_name: &str) -> Result<(), DbError> {
        self.with(|t| {
            if let Some(p) = t.players.iter_mut().find(|p| p.user_id == user_id) {
                p.display_name = display_name.to_string();
                p.updated_at = Utc::now().naive_utc();
            }
        });
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_outcome(&self, user_id: &str, outcome: GameOutcome) -> Result<(), DbError> {
        self.with(|t| {
            let Some(p) = t.players.iter_mut().find(|p| p.user_id == user_id) else {
                debug!("No stats row to update");
                return;
            };
            match outcome {
                GameOutcome::Win => p.wins += 1,
                GameOutcome::Loss => p.losses += 1,
                GameOutcome::Draw => p.draws += 1,
            }
            p.updated_at = Utc::now().naive_utc();
        });
        Ok(())
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<PlayerStats>, DbError> {
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.with(|t| {
            Self::sorted_players(t)
                .into_iter()
                .skip(skip)
                .take(take)
                .collect()
        }))
    }

    async fn total_count(&self) -> Result<i64, DbError> {
        Ok(self.with(|t| i64::try_from(t.players.len()).unwrap_or(i64::MAX)))
    }

    async fn rank(&self, user_id: &str) -> Result<i64, DbError> {
        Ok(self.with(|t| {
            let Some(me) = t.players.iter().find(|p| p.user_id == user_id) else {
                return 0;
            };
            let ahead = t.players.iter().filter(|p| p.outranks(me)).count();
            i64::try_from(ahead).unwrap_or(i64::MAX - 1) + 1
        }))
    }

    #[instrument(skip(self, record), fields(player_x = %record.player_x_id()))]
    async fn create_match(&self, record: NewMatchRecord) -> Result<MatchRecord, DbError> {
        Ok(self.with(|t| {
            let stored = MatchRecord {
                id: i32::try_from(t.matches.len()).unwrap_or(i32::MAX - 1) + 1,
                player_x_id: record.player_x_id().clone(),
                player_o_id: record.player_o_id().clone(),
                winner_id: record.winner_id().clone(),
                is_ai_game: *record.is_ai_game(),
                moves: record.moves().clone(),
                created_at: Utc::now().naive_utc(),
            };
            debug!(match_id = stored.id, "Match recorded");
            t.matches.push(stored.clone());
            stored
        }))
    }

    async fn matches_for_player(&self, user_id: &str, limit: i64) -> Result<Vec<MatchRecord>, DbError> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.with(|t| {
            t.matches
                .iter()
                .rev()
                .filter(|m| m.player_x_id == user_id || m.player_o_id.as_deref() == Some(user_id))
                .take(take)
                .cloned()
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_leaderboard_orders_by_wins_then_losses() {
        let store = InMemoryStatsStore::new();
        for (user, wins, losses) in [("c", 3, 0), ("b", 5, 3), ("a", 5, 1)] {
            store.get_or_create(user, user).await.unwrap();
            for _ in 0..wins {
                store.record_win(user).await.unwrap();
            }
            for _ in 0..losses {
                store.record_loss(user).await.unwrap();
            }
        }

        let board = store.leaderboard(10, 0).await.unwrap();
        let order: Vec<_> = board.iter().map(|p| p.user_id().as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(store.rank("b").await.unwrap(), 2);
        assert_eq!(store.rank("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = InMemoryStatsStore::new();
        let first = store.get_or_create("u1", "Alice").await.unwrap();
        let second = store.get_or_create("u1", "Renamed").await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(second.display_name(), "Alice");
        assert_eq!(store.total_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_matches_for_player_newest_first() {
        let store = InMemoryStatsStore::new();
        for opponent in ["b", "c", "d"] {
            let row = NewMatchRecord::new("a".into(), Some(opponent.into()), None, false, &[]).unwrap();
            store.create_match(row).await.unwrap();
        }
        let recent = store.matches_for_player("a", 2).await.unwrap();
        let opponents: Vec<_> = recent.iter().map(|m| m.player_o_id().as_deref()).collect();
        assert_eq!(opponents, vec![Some("d"), Some("c")]);
        assert_eq!(store.matches_for_player("c", 10).await.unwrap().len(), 1);
    }
}
