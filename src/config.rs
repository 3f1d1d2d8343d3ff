//! Server configuration loaded from TOML.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::games::tictactoe::{AiPlayer, DEFAULT_MAX_DEPTH, DEFAULT_OPTIMAL_MOVE_PROBABILITY};

/// Top-level arena configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Default, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// HTTP listener.
    server: ServerConfig,
    /// Stats storage.
    database: DatabaseConfig,
    /// Pairing loop.
    matchmaking: MatchmakingConfig,
    /// Computer opponent.
    ai: AiConfig,
    /// Finished game eviction.
    retention: RetentionConfig,
    /// Nickname overrides.
    directory: DirectoryConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    host: String,
    /// Bind port.
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path.
    path: String,
    /// Keep stats in process memory instead of SQLite.
    in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "tictactoe.db".to_string(),
            in_memory: false,
        }
    }
}

/// `[matchmaking]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Milliseconds between pairing passes.
    tick_ms: u64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self { tick_ms: 2_000 }
    }
}

impl MatchmakingConfig {
    /// Tick period as a duration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// `[ai]` section.
#[derive(Debug, Clone, Copy, PartialEq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Chance of playing the searched move.
    optimal_move_probability: f64,
    /// Search horizon in plies.
    max_depth: u8,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            optimal_move_probability: DEFAULT_OPTIMAL_MOVE_PROBABILITY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AiConfig {
    /// Builds the configured opponent.
    pub fn player(&self) -> AiPlayer {
        AiPlayer::new(self.optimal_move_probability, self.max_depth)
    }
}

/// `[retention]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Seconds a finished game stays queryable.
    finished_game_ttl_secs: u64,
    /// Seconds between eviction sweeps.
    sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            finished_game_ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl RetentionConfig {
    /// Finished game lifetime.
    pub fn finished_game_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_game_ttl_secs)
    }

    /// Sweep period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// `[directory]` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// User id to nickname.
    nicknames: BTreeMap<String, String>,
}

impl ArenaConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// value is out of range.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(
            host = %config.server.host,
            port = config.server.port,
            in_memory = config.database.in_memory,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or out-of-range values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let p = self.ai.optimal_move_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::new(format!(
                "ai.optimal_move_probability must be within 0..=1, got {}",
                p
            )));
        }
        if self.matchmaking.tick_ms == 0 {
            return Err(ConfigError::new("matchmaking.tick_ms must be positive"));
        }
        Ok(())
    }

    /// Overrides the bind host.
    pub fn set_host(&mut self, host: String) {
        self.server.host = host;
    }

    /// Overrides the bind port.
    pub fn set_port(&mut self, port: u16) {
        self.server.port = port;
    }

    /// Overrides the SQLite path.
    pub fn set_db_path(&mut self, path: String) {
        self.database.path = path;
    }

    /// Switches to in-memory stats storage.
    pub fn set_in_memory(&mut self, in_memory: bool) {
        self.database.in_memory = in_memory;
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ArenaConfig::from_toml("").unwrap();
        assert_eq!(config, ArenaConfig::default());
        assert_eq!(config.matchmaking().tick(), Duration::from_secs(2));
        assert_eq!(*config.ai().max_depth(), 6);
        assert_eq!(config.retention().finished_game_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ArenaConfig::from_toml(
            r#"
            [server]
            port = 8080

            [directory.nicknames]
            u42 = "Ada"
            "#,
        )
        .unwrap();
        assert_eq!(config.server().host(), "127.0.0.1");
        assert_eq!(*config.server().port(), 8080);
        assert_eq!(config.directory().nicknames().get("u42").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        let err = ArenaConfig::from_toml("[ai]\noptimal_move_probability = 1.5").unwrap_err();
        assert!(err.message.contains("optimal_move_probability"));
    }

    #[test]
    fn test_zero_tick_is_rejected() {
        assert!(ArenaConfig::from_toml("[matchmaking]\ntick_ms = 0").is_err());
    }
}
