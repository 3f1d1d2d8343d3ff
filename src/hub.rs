//! Per-user event channels for connected clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, instrument};

use crate::games::tictactoe::UserId;
use crate::protocol::GameEvent;

/// Delivers events to explicit sets of users.
///
/// A user may hold several connections; each receives every event
/// addressed to that user. Closed connections are dropped on delivery.
#[derive(Debug, Clone, Default)]
pub struct ClientHub {
    senders: Arc<Mutex<HashMap<UserId, Vec<UnboundedSender<GameEvent>>>>>,
}

impl ClientHub {
    /// Creates a hub with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Vec<UnboundedSender<GameEvent>>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a connection for `user_id`.
    #[instrument(skip(self))]
    pub fn connect(&self, user_id: &str) -> UnboundedReceiver<GameEvent> {
        let (tx, rx) = unbounded_channel();
        let mut senders = self.lock();
        let connections = senders.entry(user_id.to_string()).or_default();
        connections.push(tx);
        debug!(connections = connections.len(), "Client connected");
        rx
    }

    /// Closes every connection of `user_id`.
    #[instrument(skip(self))]
    pub fn disconnect(&self, user_id: &str) {
        if self.lock().remove(user_id).is_some() {
            debug!("Client disconnected");
        }
    }

    /// Whether `user_id` has an open connection.
    pub fn is_connected(&self, user_id: &str) -> bool {
        self.lock()
            .get(user_id)
            .is_some_and(|c| c.iter().any(|tx| !tx.is_closed()))
    }

    /// Sends `event` to each listed user; returns how many users got it.
    #[instrument(skip(self, event), fields(kind = event.kind(), recipients = user_ids.len()))]
    pub fn deliver(&self, user_ids: &[UserId], event: &GameEvent) -> usize {
        let mut senders = self.lock();
        let mut reached = 0;
        for user_id in user_ids {
            let Some(connections) = senders.get_mut(user_id) else {
                continue;
            };
            connections.retain(|tx| tx.send(event.clone()).is_ok());
            if connections.is_empty() {
                senders.remove(user_id);
            } else {
                reached += 1;
            }
        }
        debug!(reached, "Event delivered");
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_event(position: usize) -> GameEvent {
        GameEvent::QueueUpdated {
            position,
            total_in_queue: 2,
        }
    }

    #[tokio::test]
    async fn test_deliver_reaches_only_listed_users() {
        let hub = ClientHub::new();
        let mut alice = hub.connect("alice");
        let mut bob = hub.connect("bob");

        let reached = hub.deliver(&["alice".to_string()], &queue_event(1));
        assert_eq!(reached, 1);
        assert_eq!(alice.recv().await, Some(queue_event(1)));
        assert!(bob.try_recv().is_err());
    }

    #[test]
    fn test_closed_connections_are_pruned() {
        let hub = ClientHub::new();
        let rx = hub.connect("alice");
        drop(rx);
        assert_eq!(hub.deliver(&["alice".to_string()], &queue_event(1)), 0);
        assert!(!hub.is_connected("alice"));
    }

    #[test]
    fn test_disconnect_closes_stream() {
        let hub = ClientHub::new();
        let mut rx = hub.connect("alice");
        hub.disconnect("alice");
        assert!(rx.try_recv().is_err());
        assert!(!hub.is_connected("alice"));
    }
}
