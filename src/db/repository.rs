//! SQLite repository for player statistics and match history.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_migrations::MigrationHarness;
use tracing::{debug, info, instrument, warn};

use crate::db::{
    DbError, GameOutcome, MIGRATIONS, MatchRecord, NewMatchRecord, NewPlayerStats, PlayerStats,
    StatsStore, schema,
};

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Diesel-backed [`StatsStore`].
///
/// Each call opens its own connection, so the path must name a file; use
/// [`crate::InMemoryStatsStore`] for throwaway storage.
#[derive(Debug, Clone)]
pub struct StatsRepository {
    db_path: String,
}

impl StatsRepository {
    /// Creates a new repository connected to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path must not be empty"));
        }
        info!(path = %db_path, "Creating StatsRepository");
        Ok(Self { db_path })
    }

    /// Opens the database and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file cannot be opened or a migration fails.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, DbError> {
        let repo = Self::new(db_path)?;
        repo.run_migrations()?;
        Ok(repo)
    }

    /// Applies embedded migrations that have not run yet.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}")).execute(&mut conn)?;
        Ok(conn)
    }

    /// Looks up a player's stats row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn find_player(&self, user_id: &str) -> Result<Option<PlayerStats>, DbError> {
        let mut conn = self.connection()?;
        let stats = schema::player_stats::table
            .filter(schema::player_stats::user_id.eq(user_id))
            .select(PlayerStats::as_select())
            .first(&mut conn)
            .optional()?;
        debug!(found = stats.is_some(), "Player lookup finished");
        Ok(stats)
    }

    /// Returns an existing stats row or inserts a zeroed one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_or_create_player(&self, user_id: &str, display_name: &str) -> Result<PlayerStats, DbError> {
        if let Some(existing) = self.find_player(user_id)? {
            return Ok(existing);
        }

        let mut conn = self.connection()?;
        let inserted = diesel::insert_into(schema::player_stats::table)
            .values(&NewPlayerStats::new(user_id.to_string(), display_name.to_string()))
            .returning(PlayerStats::as_returning())
            .get_result(&mut conn);

        match inserted {
            Ok(stats) => {
                info!(stats_id = stats.id(), user_id = %user_id, "Player stats created");
                Ok(stats)
            }
            // Another request created the row between our lookup and insert.
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                debug!(user_id = %user_id, "Lost insert race, reloading");
                self.find_player(user_id)?
                    .ok_or_else(|| DbError::new(format!("Stats for '{}' vanished after insert", user_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the stored display name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn rename_player(&self, user_id: &str, display_name: &str) -> Result<(), DbError> {
        use schema::player_stats::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(dsl::player_stats.filter(dsl::user_id.eq(user_id)))
            .set((
                dsl::display_name.eq(display_name),
                dsl::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        debug!(updated, "Display name updated");
        Ok(())
    }

    /// Increments the counter for `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn increment(&self, user_id: &str, outcome: GameOutcome) -> Result<(), DbError> {
        use schema::player_stats::dsl;
        let mut conn = self.connection()?;
        let target = dsl::player_stats.filter(dsl::user_id.eq(user_id));
        let now = Utc::now().naive_utc();

        let updated = match outcome {
            GameOutcome::Win => diesel::update(target)
                .set((dsl::wins.eq(dsl::wins + 1), dsl::updated_at.eq(now)))
                .execute(&mut conn)?,
            GameOutcome::Loss => diesel::update(target)
                .set((dsl::losses.eq(dsl::losses + 1), dsl::updated_at.eq(now)))
                .execute(&mut conn)?,
            GameOutcome::Draw => diesel::update(target)
                .set((dsl::draws.eq(dsl::draws + 1), dsl::updated_at.eq(now)))
                .execute(&mut conn)?,
        };

        if updated == 0 {
            warn!(user_id = %user_id, ?outcome, "No stats row to update");
        }
        Ok(())
    }

    /// Loads one page of the leaderboard.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn load_leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<PlayerStats>, DbError> {
        use schema::player_stats::dsl;
        let mut conn = self.connection()?;
        let players = dsl::player_stats
            .order((dsl::wins.desc(), dsl::losses.asc(), dsl::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(PlayerStats::as_select())
            .load(&mut conn)?;
        info!(count = players.len(), "Leaderboard loaded");
        Ok(players)
    }

    /// Counts players with a stats row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn count_players(&self) -> Result<i64, DbError> {
        let mut conn = self.connection()?;
        Ok(schema::player_stats::table.count().get_result(&mut conn)?)
    }

    /// Computes a player's 1-based rank, 0 if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn player_rank(&self, user_id: &str) -> Result<i64, DbError> {
        use schema::player_stats::dsl;
        let Some(stats) = self.find_player(user_id)? else {
            return Ok(0);
        };

        let mut conn = self.connection()?;
        let ahead: i64 = dsl::player_stats
            .filter(
                dsl::wins
                    .gt(stats.wins)
                    .or(dsl::wins.eq(stats.wins).and(dsl::losses.lt(stats.losses))),
            )
            .count()
            .get_result(&mut conn)?;
        Ok(ahead + 1)
    }

    /// Records a finished match.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, record), fields(player_x = %record.player_x_id(), ai = record.is_ai_game()))]
    pub fn insert_match(&self, record: NewMatchRecord) -> Result<MatchRecord, DbError> {
        let mut conn = self.connection()?;
        let stored = diesel::insert_into(schema::match_history::table)
            .values(&record)
            .returning(MatchRecord::as_returning())
            .get_result(&mut conn)?;
        info!(match_id = stored.id(), "Match recorded");
        Ok(stored)
    }

    /// Loads recent matches for a player, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn load_matches(&self, user_id: &str, limit: i64) -> Result<Vec<MatchRecord>, DbError> {
        use schema::match_history::dsl;
        let mut conn = self.connection()?;
        let matches = dsl::match_history
            .filter(dsl::player_x_id.eq(user_id).or(dsl::player_o_id.eq(user_id)))
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .limit(limit)
            .select(MatchRecord::as_select())
            .load(&mut conn)?;
        debug!(count = matches.len(), "Matches loaded");
        Ok(matches)
    }

    /// Runs a synchronous repository call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&StatsRepository) -> Result<T, DbError> + Send + 'static,
    {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || f(&repo)).await?
    }
}

#[async_trait]
impl StatsStore for StatsRepository {
    async fn get_or_create(&self, user_id: &str, display_name: &str) -> Result<PlayerStats, DbError> {
        let (user_id, display_name) = (user_id.to_string(), display_name.to_string());
        self.blocking(move |repo| repo.get_or_create_player(&user_id, &display_name))
            .await
    }

    async fn get_by_user_id(&self, user_id: &str) -> Result<Option<PlayerStats>, DbError> {
        let user_id = user_id.to_string();
        self.blocking(move |repo| repo.find_player(&user_id)).await
    }

    async fn update_display_name(&self, user_id: &str, display_name: &str) -> Result<(), DbError> {
        let (user_id, display_name) = (user_id.to_string(), display_name.to_string());
        self.blocking(move |repo| repo.rename_player(&user_id, &display_name))
            .await
    }

    async fn record_outcome(&self, user_id: &str, outcome: GameOutcome) -> Result<(), DbError> {
        let user_id = user_id.to_string();
        self.blocking(move |repo| repo.increment(&user_id, outcome)).await
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> Result<Vec<PlayerStats>, DbError> {
        self.blocking(move |repo| repo.load_leaderboard(limit, offset)).await
    }

    async fn total_count(&self) -> Result<i64, DbError> {
        self.blocking(|repo| repo.count_players()).await
    }

    async fn rank(&self, user_id: &str) -> Result<i64, DbError> {
        let user_id = user_id.to_string();
        self.blocking(move |repo| repo.player_rank(&user_id)).await
    }

    async fn create_match(&self, record: NewMatchRecord) -> Result<MatchRecord, DbError> {
        self.blocking(move |repo| repo.insert_match(record)).await
    }

    async fn matches_for_player(&self, user_id: &str, limit: i64) -> Result<Vec<MatchRecord>, DbError> {
        let user_id = user_id.to_string();
        self.blocking(move |repo| repo.load_matches(&user_id, limit)).await
    }
}
