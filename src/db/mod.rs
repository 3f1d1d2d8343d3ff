//! Persistence layer for player statistics and match history.

mod error;
mod memory;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only
mod store;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub use error::DbError;
pub use memory::InMemoryStatsStore;
pub use models::{GameOutcome, MatchRecord, NewMatchRecord, PlayerStats, RecordedMove};
pub use repository::StatsRepository;
pub use store::StatsStore;

pub(crate) use models::NewPlayerStats;

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
