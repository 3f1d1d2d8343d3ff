//! TicTacToe Arena - game and matchmaking core with an HTTP surface
//!
//! # Architecture
//!
//! - **Games**: board rules and a beatable minimax opponent
//! - **Manager**: authoritative store of in-memory games and the move pipeline
//! - **Matchmaking**: FIFO pairing queue driven by a background tick
//! - **Tracker / Hub**: scope pushed events to players and spectators
//! - **Db**: player statistics and match history (SQLite via diesel)
//! - **Server**: axum routes over [`ArenaService`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tictactoe_arena::{ArenaConfig, ArenaService, InMemoryStatsStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ArenaConfig::default();
//! let service = ArenaService::from_config(&config, Arc::new(InMemoryStatsStore::new()));
//!
//! let game = service.create_ai_game("alice").await;
//! let reply = service.make_move(&game.game_id, "alice", 4).await;
//! assert!(reply.success);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod db;
mod directory;
mod games;
mod hub;
mod manager;
mod matchmaking;
mod protocol;
mod server;
mod service;
mod tracker;

// Crate-level exports - Configuration
pub use config::{
    AiConfig, ArenaConfig, ConfigError, DatabaseConfig, DirectoryConfig, MatchmakingConfig,
    RetentionConfig, ServerConfig,
};

// Crate-level exports - Persistence
pub use db::{
    DbError, GameOutcome, InMemoryStatsStore, MIGRATIONS, MatchRecord, NewMatchRecord,
    PlayerStats, RecordedMove, StatsRepository, StatsStore,
};

// Crate-level exports - Identity
pub use directory::{DirectoryError, NicknameDirectory, StaticDirectory, resolve_nickname};

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    AI_DISPLAY_NAME, AI_USER_ID, AiPlayer, BOARD_SIZE, Board, Cell, DEFAULT_MAX_DEPTH,
    DEFAULT_OPTIMAL_MOVE_PROBABILITY, Game, GameId, GameStatus, Mark, Move, MoveError, Placement,
    Player, UserId, WIN_PATTERNS, WinningLine, check_winner, is_draw, is_full, is_game_over,
};

// Crate-level exports - Core services
pub use hub::ClientHub;
pub use manager::{DEFAULT_FINISHED_GAME_TTL, Forfeit, GameManager, MoveOutcome};
pub use matchmaking::{
    DEFAULT_TICK, JoinOutcome, MatchmakingListener, MatchmakingQueue, NoopListener, QueueEntry,
    QueueError, QueueStatus,
};
pub use tracker::GameClientTracker;

// Crate-level exports - Service and transport
pub use protocol::{
    ActiveGameSummary, GameEvent, GameResponse, GameView, JoinQueueResponse, LeaderboardQuery,
    LeaderboardResponse, ListActiveGamesResponse, MakeMoveRequest, MakeMoveResponse,
    MatchHistoryEntry, MatchHistoryQuery, MatchHistoryResponse, MoveView, PlayerStatsResponse,
    PlayerStatsView, PlayerView, RematchResponse, SuccessResponse, WatchGameResponse,
};
pub use server::{Caller, USER_ID_HEADER, router, serve};
pub use service::{ArenaService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, ServiceError};
