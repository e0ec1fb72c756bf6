use axum::extract::ws::Message;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::registry::ConnectionSender;

#[derive(Default)]
struct RoomState {
    // conversation_id -> connection_id -> sender
    rooms: HashMap<Uuid, HashMap<Uuid, ConnectionSender>>,
    // connection_id -> joined conversation ids, so a disconnect can leave
    // every room the connection joined
    joined: HashMap<Uuid, HashSet<Uuid>>,
}

/// Ephemeral per-conversation broadcast groups.
///
/// Membership is derived state: it is rebuilt by the join operation after a
/// reconnect and never persisted. The store-backed participant check happens
/// before `join` is called.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RoomState>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, connection_id: Uuid, conversation_id: Uuid, sender: ConnectionSender) {
        let mut guard = self.inner.write().await;
        guard
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(connection_id, sender);
        guard
            .joined
            .entry(connection_id)
            .or_default()
            .insert(conversation_id);
    }

    pub async fn leave(&self, connection_id: Uuid, conversation_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&conversation_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                guard.rooms.remove(&conversation_id);
            }
        }
        if let Some(joined) = guard.joined.get_mut(&connection_id) {
            joined.remove(&conversation_id);
            if joined.is_empty() {
                guard.joined.remove(&connection_id);
            }
        }
    }

    /// Leave every room a connection joined; called on disconnect so no
    /// membership leaks past the connection's lifetime.
    pub async fn leave_all(&self, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        let Some(joined) = guard.joined.remove(&connection_id) else {
            return;
        };
        for conversation_id in joined {
            if let Some(members) = guard.rooms.get_mut(&conversation_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    guard.rooms.remove(&conversation_id);
                }
            }
        }
    }

    /// Emit a payload to every connection currently joined to a room.
    pub async fn broadcast(&self, conversation_id: Uuid, payload: &str) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&conversation_id) {
            members.retain(|_, sender| sender.send(Message::Text(payload.to_string())).is_ok());
            if members.is_empty() {
                guard.rooms.remove(&conversation_id);
            }
        }
    }

    pub async fn joined_rooms(&self, connection_id: Uuid) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .joined
            .get(&connection_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(&conversation_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.rooms.clear();
        guard.joined.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (ConnectionSender, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_join_and_broadcast() {
        let rooms = RoomRegistry::new();
        let conversation_id = Uuid::new_v4();

        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        rooms.join(Uuid::new_v4(), conversation_id, tx_a).await;
        rooms.join(Uuid::new_v4(), conversation_id, tx_b).await;

        rooms.broadcast(conversation_id, "news").await;

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await {
                Some(Message::Text(text)) => assert_eq!(text, "news"),
                other => panic!("expected text message, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room_is_noop() {
        let rooms = RoomRegistry::new();
        rooms.broadcast(Uuid::new_v4(), "nobody home").await;
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let rooms = RoomRegistry::new();
        let conversation_id = Uuid::new_v4();
        let connection_id = Uuid::new_v4();

        let (tx, mut rx) = channel();
        rooms.join(connection_id, conversation_id, tx).await;
        rooms.leave(connection_id, conversation_id).await;

        rooms.broadcast(conversation_id, "gone").await;
        assert!(rx.try_recv().is_err());
        assert!(rooms.joined_rooms(connection_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_all_cleans_every_room() {
        let rooms = RoomRegistry::new();
        let connection_id = Uuid::new_v4();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();

        let (tx, _rx) = channel();
        rooms.join(connection_id, room_a, tx.clone()).await;
        rooms.join(connection_id, room_b, tx).await;
        assert_eq!(rooms.joined_rooms(connection_id).await.len(), 2);

        rooms.leave_all(connection_id).await;

        assert!(rooms.joined_rooms(connection_id).await.is_empty());
        assert_eq!(rooms.room_size(room_a).await, 0);
        assert_eq!(rooms.room_size(room_b).await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_after_leave_all() {
        let rooms = RoomRegistry::new();
        let connection_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();

        let (tx, _rx) = channel();
        rooms.join(connection_id, conversation_id, tx.clone()).await;
        rooms.leave_all(connection_id).await;
        rooms.join(connection_id, conversation_id, tx).await;

        assert_eq!(rooms.room_size(conversation_id).await, 1);
        assert_eq!(rooms.joined_rooms(connection_id).await, vec![conversation_id]);
    }

    #[tokio::test]
    async fn test_dead_members_pruned_on_broadcast() {
        let rooms = RoomRegistry::new();
        let conversation_id = Uuid::new_v4();

        let (tx, rx) = channel();
        drop(rx);
        rooms.join(Uuid::new_v4(), conversation_id, tx).await;

        rooms.broadcast(conversation_id, "anyone?").await;
        assert_eq!(rooms.room_size(conversation_id).await, 0);
    }
}
