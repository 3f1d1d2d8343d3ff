//! Which connected clients care about which game.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, instrument};

use crate::games::tictactoe::{GameId, UserId};

#[derive(Debug, Default)]
struct Registry {
    game_clients: BTreeMap<GameId, BTreeSet<UserId>>,
    client_games: HashMap<UserId, GameId>,
}

impl Registry {
    fn attach(&mut self, game_id: &str, user_id: &str) {
        self.game_clients
            .entry(game_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        if let Some(previous) = self
            .client_games
            .insert(user_id.to_string(), game_id.to_string())
            .filter(|previous| previous != game_id)
        {
            debug!(%previous, "Client association overwritten");
        }
    }
}

/// Scopes game events to players and spectators.
///
/// A client is associated with one game at a time. Registering it with a
/// second game moves the reverse mapping without detaching it from the
/// first game's client set.
#[derive(Debug, Clone, Default)]
pub struct GameClientTracker {
    inner: Arc<Mutex<Registry>>,
}

impl GameClientTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a participant.
    #[instrument(skip(self))]
    pub fn add_player(&self, game_id: &str, user_id: &str) {
        self.lock().attach(game_id, user_id);
    }

    /// Registers a spectator.
    #[instrument(skip(self))]
    pub fn add_spectator(&self, game_id: &str, user_id: &str) {
        self.lock().attach(game_id, user_id);
    }

    /// Everyone registered for a game, in id order.
    pub fn game_clients(&self, game_id: &str) -> Vec<UserId> {
        self.lock()
            .game_clients
            .get(game_id)
            .map(|clients| clients.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The game a client is currently associated with.
    pub fn client_game(&self, user_id: &str) -> Option<GameId> {
        self.lock().client_games.get(user_id).cloned()
    }

    /// Detaches a client from its current game.
    #[instrument(skip(self))]
    pub fn remove_client(&self, user_id: &str) {
        let mut registry = self.lock();
        let Some(game_id) = registry.client_games.remove(user_id) else {
            return;
        };
        if let Some(clients) = registry.game_clients.get_mut(&game_id) {
            clients.remove(user_id);
            if clients.is_empty() {
                registry.game_clients.remove(&game_id);
            }
        }
    }

    /// Detaches every client of a finished game.
    #[instrument(skip(self))]
    pub fn cleanup_game(&self, game_id: &str) {
        let mut registry = self.lock();
        let Some(clients) = registry.game_clients.remove(game_id) else {
            return;
        };
        for user_id in &clients {
            registry.client_games.remove(user_id);
        }
        debug!(count = clients.len(), "Game clients released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_players_and_spectators_share_scope() {
        let tracker = GameClientTracker::new();
        tracker.add_player("g1", "alice");
        tracker.add_player("g1", "bob");
        tracker.add_spectator("g1", "carol");

        assert_eq!(tracker.game_clients("g1"), vec!["alice", "bob", "carol"]);
        assert_eq!(tracker.client_game("carol").as_deref(), Some("g1"));
        assert!(tracker.game_clients("g2").is_empty());
    }

    #[test]
    fn test_switching_games_overwrites_reverse_mapping_only() {
        let tracker = GameClientTracker::new();
        tracker.add_spectator("g1", "carol");
        tracker.add_player("g2", "carol");

        assert_eq!(tracker.client_game("carol").as_deref(), Some("g2"));
        // The stale membership in g1 survives the switch.
        assert_eq!(tracker.game_clients("g1"), vec!["carol"]);
        assert_eq!(tracker.game_clients("g2"), vec!["carol"]);

        tracker.remove_client("carol");
        assert!(tracker.game_clients("g2").is_empty());
        assert_eq!(tracker.game_clients("g1"), vec!["carol"]);
        assert_eq!(tracker.client_game("carol"), None);
    }

    #[test]
    fn test_remove_client_drops_empty_games() {
        let tracker = GameClientTracker::new();
        tracker.add_player("g1", "alice");
        tracker.remove_client("alice");
        tracker.remove_client("alice");
        assert!(tracker.game_clients("g1").is_empty());
        assert_eq!(tracker.client_game("alice"), None);
    }

    #[test]
    fn test_cleanup_game_detaches_everyone() {
        let tracker = GameClientTracker::new();
        tracker.add_player("g1", "alice");
        tracker.add_spectator("g1", "carol");
        tracker.add_player("g2", "bob");

        tracker.cleanup_game("g1");
        assert!(tracker.game_clients("g1").is_empty());
        assert_eq!(tracker.client_game("alice"), None);
        assert_eq!(tracker.client_game("carol"), None);
        assert_eq!(tracker.client_game("bob").as_deref(), Some("g2"));
    }
}
