use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Type alias for a connection's outbound message channel
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Process-wide map from user identity to the set of live connections.
///
/// Thread-safe via Arc<RwLock<>>; each user can hold multiple concurrent
/// connections (multi-device). A connection is either fully bound to exactly
/// one user or absent, never partially registered.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, ConnectionSender>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user after a successful handshake.
    pub async fn register(&self, user_id: Uuid, connection_id: Uuid, sender: ConnectionSender) {
        let mut guard = self.inner.write().await;
        guard.entry(user_id).or_default().insert(connection_id, sender);
    }

    /// Remove a connection binding. Dropping the last connection for a user
    /// removes the user entry entirely so the map never grows unbounded.
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(connections) = guard.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    /// Fan a payload out to every live connection of a user.
    ///
    /// Returns true iff at least one connection existed for the user; sending
    /// to an absent user is not an error, the caller treats the event as
    /// "not live-delivered". Dead channels are pruned as they are found.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> bool {
        let mut guard = self.inner.write().await;
        let Some(connections) = guard.get_mut(&user_id) else {
            return false;
        };
        let had_connections = !connections.is_empty();
        connections.retain(|_, sender| sender.send(Message::Text(payload.to_string())).is_ok());
        if connections.is_empty() {
            guard.remove(&user_id);
        }
        had_connections
    }

    /// Fan a payload out to several users; true iff any of them had a
    /// live connection.
    pub async fn send_to_users(&self, user_ids: &[Uuid], payload: &str) -> bool {
        let mut delivered = false;
        for user_id in user_ids {
            if self.send_to_user(*user_id, payload).await {
                delivered = true;
            }
        }
        delivered
    }

    /// Connection ids currently bound to a user.
    pub async fn connections(&self, user_id: Uuid) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .get(&user_id)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connected_users(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn total_connections(&self) -> usize {
        self.inner.read().await.values().map(|c| c.len()).sum()
    }

    /// Drop every binding (shutdown path).
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (ConnectionSender, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.connected_users().await, 0);
        assert_eq!(registry.total_connections().await, 0);
    }

    #[tokio::test]
    async fn test_register_multiple_devices_for_one_user() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        for _ in 0..3 {
            let (tx, _rx) = channel();
            registry.register(user_id, Uuid::new_v4(), tx).await;
        }

        assert_eq!(registry.connections(user_id).await.len(), 3);
        assert_eq!(registry.connected_users().await, 1);
        assert_eq!(registry.total_connections().await, 3);
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_connection() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        registry.register(user_id, Uuid::new_v4(), tx_a).await;
        registry.register(user_id, Uuid::new_v4(), tx_b).await;

        assert!(registry.send_to_user(user_id, "hello").await);

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await {
                Some(Message::Text(text)) => assert_eq!(text, "hello"),
                other => panic!("expected text message, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_to_absent_user_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send_to_user(Uuid::new_v4(), "hello").await);
    }

    #[tokio::test]
    async fn test_unregister_last_connection_removes_user() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();

        let (tx, _rx) = channel();
        registry.register(user_id, connection_id, tx).await;
        registry.unregister(user_id, connection_id).await;

        assert!(registry.connections(user_id).await.is_empty());
        assert_eq!(registry.connected_users().await, 0);
        assert!(!registry.send_to_user(user_id, "hello").await);
    }

    #[tokio::test]
    async fn test_unregister_one_of_many_keeps_user_reachable() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        registry.register(user_id, first, tx_a).await;
        registry.register(user_id, second, tx_b).await;

        registry.unregister(user_id, first).await;

        assert_eq!(registry.connections(user_id).await, vec![second]);
        assert!(registry.send_to_user(user_id, "still here").await);
    }

    #[tokio::test]
    async fn test_send_to_users_true_when_any_connected() {
        let registry = ConnectionRegistry::new();
        let connected = Uuid::new_v4();
        let absent = Uuid::new_v4();

        let (tx, mut rx) = channel();
        registry.register(connected, Uuid::new_v4(), tx).await;

        assert!(registry.send_to_users(&[absent, connected], "ping").await);
        assert!(matches!(rx.recv().await, Some(Message::Text(_))));

        assert!(!registry.send_to_users(&[absent], "ping").await);
    }

    #[tokio::test]
    async fn test_dead_channels_are_pruned_on_send() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (tx, rx) = channel();
        drop(rx);
        registry.register(user_id, Uuid::new_v4(), tx).await;

        // The connection existed at send time, so delivery reports true,
        // but the dead channel is gone afterwards.
        assert!(registry.send_to_user(user_id, "into the void").await);
        assert!(registry.connections(user_id).await.is_empty());
        assert!(!registry.send_to_user(user_id, "again").await);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let registry = ConnectionRegistry::new();
        for _ in 0..3 {
            let (tx, _rx) = channel();
            registry.register(Uuid::new_v4(), Uuid::new_v4(), tx).await;
        }
        assert_eq!(registry.connected_users().await, 3);

        registry.clear().await;
        assert_eq!(registry.connected_users().await, 0);
        assert_eq!(registry.total_connections().await, 0);
    }
}
