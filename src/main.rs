//! TicTacToe Arena - command-line entry point.

#![warn(missing_docs)]

mod cli;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use tictactoe_arena::{
    ArenaConfig, ArenaService, InMemoryStatsStore, StatsRepository, StatsStore, serve,
};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db_path,
            in_memory,
        } => run_server(config, host, port, db_path, in_memory).await,
        Command::Leaderboard { db_path, limit } => print_leaderboard(db_path, limit).await,
    }
}

/// Run the HTTP game server
#[instrument(skip_all)]
async fn run_server(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<String>,
    in_memory: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => ArenaConfig::from_file(path)?,
        None => ArenaConfig::default(),
    };
    if let Some(host) = host {
        config.set_host(host);
    }
    if let Some(port) = port {
        config.set_port(port);
    }
    if let Some(path) = db_path {
        config.set_db_path(path);
    }
    if in_memory {
        config.set_in_memory(true);
    }

    let store: Arc<dyn StatsStore> = if *config.database().in_memory() {
        info!("Using in-memory stats store");
        Arc::new(InMemoryStatsStore::new())
    } else {
        let path = config.database().path().clone();
        info!(path = %path, "Opening stats database");
        Arc::new(StatsRepository::open(path)?)
    };

    let service = ArenaService::from_config(&config, store);
    let tasks = service.spawn_background(
        config.matchmaking().tick(),
        config.retention().sweep_interval(),
    );

    let addr: SocketAddr = format!("{}:{}", config.server().host(), config.server().port())
        .parse()
        .context("Invalid bind address")?;

    let result = tokio::select! {
        result = serve(service, addr) => result.context("HTTP server failed"),
        signal = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            signal.context("Failed to listen for ctrl-c")
        }
    };

    for task in tasks {
        task.abort();
    }
    result
}

/// Print standings from the database
#[instrument]
async fn print_leaderboard(db_path: String, limit: i64) -> Result<()> {
    let repo = StatsRepository::open(db_path)?;
    let players = repo.leaderboard(limit.max(1), 0).await?;
    let total = repo.total_count().await?;

    println!("{:>4}  {:<24} {:>5} {:>6} {:>5}", "#", "Player", "Wins", "Losses", "Draws");
    for (i, player) in players.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {:>5} {:>6} {:>5}",
            i + 1,
            player.display_name(),
            player.wins(),
            player.losses(),
            player.draws()
        );
    }
    println!("{} of {} players", players.len(), total);
    Ok(())
}
