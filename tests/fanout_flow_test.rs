//! End-to-end delivery flow over the in-memory fan-out graph: connection
//! registry, room registry, and the event vocabulary, without any external
//! services.

use axum::extract::ws::Message;
use conversation_service::websocket::events::{emit_to_conversation, emit_to_user, ServerEvent};
use conversation_service::websocket::{ConnectionRegistry, RoomRegistry};
use tokio::sync::mpsc;
use uuid::Uuid;

fn collect_payloads(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            out.push(serde_json::from_str(&text).expect("payload is JSON"));
        }
    }
    out
}

#[tokio::test]
async fn test_dual_delivery_reaches_room_and_inbox_viewers() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRegistry::new();
    let conversation_id = Uuid::new_v4();

    // User A has the conversation open: connection registered and joined
    let user_a = Uuid::new_v4();
    let conn_a = Uuid::new_v4();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    registry.register(user_a, conn_a, tx_a.clone()).await;
    rooms.join(conn_a, conversation_id, tx_a).await;

    // User B is connected but only viewing the inbox list: no room join
    let user_b = Uuid::new_v4();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    registry.register(user_b, Uuid::new_v4(), tx_b).await;

    let event = ServerEvent::ConversationRead {
        conversation_id,
        reader_id: user_a,
        message_ids: vec![Uuid::new_v4()],
        marked_count: 1,
    };
    emit_to_conversation(&rooms, &registry, conversation_id, &[user_b], &event).await;

    // The joined connection hears it through the room
    let from_room = collect_payloads(&mut rx_a);
    assert_eq!(from_room.len(), 1);
    assert_eq!(from_room[0]["type"], "conversation-read");

    // The inbox viewer hears it through the user-level channel
    let direct = collect_payloads(&mut rx_b);
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0]["type"], "conversation-read");
    assert_eq!(direct[0]["conversation_id"], conversation_id.to_string());
}

#[tokio::test]
async fn test_disconnect_removes_reachability_and_room_memberships() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRegistry::new();
    let conversation_id = Uuid::new_v4();

    let user_id = Uuid::new_v4();
    let connection_id = Uuid::new_v4();
    let (tx, _rx) = mpsc::unbounded_channel();

    registry.register(user_id, connection_id, tx.clone()).await;
    rooms.join(connection_id, conversation_id, tx).await;
    assert_eq!(rooms.room_size(conversation_id).await, 1);

    // Disconnect sequence: every joined room is left, then the binding drops
    rooms.leave_all(connection_id).await;
    registry.unregister(user_id, connection_id).await;

    assert!(registry.connections(user_id).await.is_empty());
    assert_eq!(rooms.room_size(conversation_id).await, 0);

    let event = ServerEvent::NotificationUnreadCount { count: 1 };
    assert!(!emit_to_user(&registry, user_id, &event).await);
}

#[tokio::test]
async fn test_multi_device_user_hears_every_event_once_per_device() {
    let registry = ConnectionRegistry::new();
    let user_id = Uuid::new_v4();

    let (tx_phone, mut rx_phone) = mpsc::unbounded_channel();
    let (tx_laptop, mut rx_laptop) = mpsc::unbounded_channel();
    registry.register(user_id, Uuid::new_v4(), tx_phone).await;
    registry.register(user_id, Uuid::new_v4(), tx_laptop).await;

    let event = ServerEvent::NotificationUnreadCount { count: 4 };
    assert!(emit_to_user(&registry, user_id, &event).await);

    for rx in [&mut rx_phone, &mut rx_laptop] {
        let payloads = collect_payloads(rx);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["type"], "notification-unread-count");
        assert_eq!(payloads[0]["count"], 4);
    }
}

#[tokio::test]
async fn test_events_arrive_in_emit_order_within_a_conversation() {
    let rooms = RoomRegistry::new();
    let conversation_id = Uuid::new_v4();

    let conn = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel();
    rooms.join(conn, conversation_id, tx).await;

    for count in 1..=3_i64 {
        let event = ServerEvent::NotificationUnreadCount { count };
        let payload = event.to_payload().unwrap();
        rooms.broadcast(conversation_id, &payload).await;
    }

    let payloads = collect_payloads(&mut rx);
    let counts: Vec<i64> = payloads
        .iter()
        .map(|p| p["count"].as_i64().unwrap())
        .collect();
    assert_eq!(counts, vec![1, 2, 3]);
}
