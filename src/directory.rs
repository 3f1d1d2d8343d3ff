//! Nickname lookup for users.

use std::collections::BTreeMap;

use async_trait::async_trait;
use derive_more::Display;
use tracing::debug;

/// Why a nickname could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DirectoryError {
    /// The directory has no entry for the user.
    #[display("No directory entry for {}", _0)]
    UnknownUser(String),
    /// The backing directory could not be reached.
    #[display("Directory unavailable: {}", _0)]
    Unavailable(String),
}

impl std::error::Error for DirectoryError {}

/// Source of display names.
#[async_trait]
pub trait NicknameDirectory: Send + Sync + std::fmt::Debug {
    /// Nickname for `user_id`; empty strings count as missing.
    async fn nickname(&self, user_id: &str) -> Result<String, DirectoryError>;
}

/// Directory backed by a fixed table, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    nicknames: BTreeMap<String, String>,
}

impl StaticDirectory {
    /// Creates a directory from user id to nickname pairs.
    pub fn new(nicknames: BTreeMap<String, String>) -> Self {
        Self { nicknames }
    }
}

#[async_trait]
impl NicknameDirectory for StaticDirectory {
    async fn nickname(&self, user_id: &str) -> Result<String, DirectoryError> {
        self.nicknames
            .get(user_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownUser(user_id.to_string()))
    }
}

/// Resolves a display name, falling back to the raw user id.
///
/// Lookup failures are logged and never reach the caller.
pub async fn resolve_nickname(directory: &dyn NicknameDirectory, user_id: &str) -> String {
    match directory.nickname(user_id).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => user_id.to_string(),
        Err(e) => {
            debug!(user_id, error = %e, "Nickname lookup failed, using user id");
            user_id.to_string()
        }
    }
}
