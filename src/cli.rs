//! Command-line interface for tictactoe_arena.

use clap::{Parser, Subcommand};

/// TicTacToe Arena - game server with AI opponent and matchmaking
#[derive(Parser, Debug)]
#[command(name = "tictactoe_arena")]
#[command(about = "Tic-tac-toe game server with AI opponent and matchmaking", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP game server
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file (overrides config)
        #[arg(long)]
        db_path: Option<String>,

        /// Keep stats in memory only
        #[arg(long)]
        in_memory: bool,
    },

    /// Print the leaderboard from a database file
    Leaderboard {
        /// Path to the database file
        #[arg(long, default_value = "tictactoe.db")]
        db_path: String,

        /// Number of players to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}
