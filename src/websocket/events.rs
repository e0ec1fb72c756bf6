//! WebSocket event vocabulary and fan-out helpers.
//!
//! All outbound events share one flat JSON structure:
//!
//! ```json
//! {
//!     "type": "conversation-message",
//!     "timestamp": "2026-08-04T10:30:00Z",
//!     ...event fields...
//! }
//! ```
//!
//! Serialization happens in exactly one place (`to_payload_value`); handlers
//! and services never build event JSON by hand.

use crate::models::{MessageDto, NotificationRecord};
use crate::websocket::{ConnectionRegistry, RoomRegistry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events a client may send over an admitted connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join-conversation")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename = "leave-conversation")]
    LeaveConversation { conversation_id: Uuid },
}

/// Events the server pushes to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Sent immediately after a connection is admitted and registered
    #[serde(rename = "connection-established")]
    ConnectionEstablished {
        connection_id: Uuid,
        user_id: Uuid,
    },

    /// New message in a conversation (room + direct recipients)
    #[serde(rename = "conversation-message")]
    ConversationMessage {
        conversation_id: Uuid,
        message: MessageDto,
        sender_id: Uuid,
    },

    /// Drives inbox list updates for one recipient
    #[serde(rename = "conversation-updated")]
    ConversationUpdated {
        conversation_id: Uuid,
        last_message: MessageDto,
        unread_count: Option<i64>,
    },

    /// Read receipts landed; sent to the other participants
    #[serde(rename = "conversation-read")]
    ConversationRead {
        conversation_id: Uuid,
        reader_id: Uuid,
        message_ids: Vec<Uuid>,
        marked_count: usize,
    },

    #[serde(rename = "notification-created")]
    NotificationCreated { notification: NotificationRecord },

    #[serde(rename = "notification-updated")]
    NotificationUpdated { notification: NotificationRecord },

    #[serde(rename = "notification-deleted")]
    NotificationDeleted { id: Uuid },

    /// Authoritative unread counter, always a fresh count, never a delta
    #[serde(rename = "notification-unread-count")]
    NotificationUnreadCount { count: i64 },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection-established",
            Self::ConversationMessage { .. } => "conversation-message",
            Self::ConversationUpdated { .. } => "conversation-updated",
            Self::ConversationRead { .. } => "conversation-read",
            Self::NotificationCreated { .. } => "notification-created",
            Self::NotificationUpdated { .. } => "notification-updated",
            Self::NotificationDeleted { .. } => "notification-deleted",
            Self::NotificationUnreadCount { .. } => "notification-unread-count",
        }
    }

    /// Build the flat broadcast payload. This is the only place where event
    /// serialization happens.
    pub fn to_payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        // Flatten event-specific fields into the payload
        let event_data = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = event_data {
            for (_, fields) in map {
                if let serde_json::Value::Object(fields) = fields {
                    for (key, value) in fields {
                        payload[key] = value;
                    }
                }
            }
        }

        Ok(payload)
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        self.to_payload_value().map(|v| v.to_string())
    }
}

/// Push an event to every live connection of one user. Best-effort: a user
/// with zero connections is a normal miss, a serialization failure is logged.
/// Returns true iff the user had at least one live connection.
pub async fn emit_to_user(registry: &ConnectionRegistry, user_id: Uuid, event: &ServerEvent) -> bool {
    match event.to_payload() {
        Ok(payload) => registry.send_to_user(user_id, &payload).await,
        Err(e) => {
            tracing::error!(error = %e, event = event.event_type(), "failed to serialize event");
            false
        }
    }
}

/// Dual delivery for conversation events: emit to the room (reaches
/// currently-joined connections) and directly to each recipient's user-level
/// channel (reaches users who have not joined the room, e.g. viewing an inbox
/// list). Room membership is optional, so both paths are always taken.
pub async fn emit_to_conversation(
    rooms: &RoomRegistry,
    registry: &ConnectionRegistry,
    conversation_id: Uuid,
    recipient_ids: &[Uuid],
    event: &ServerEvent,
) {
    let payload = match event.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, event = event.event_type(), "failed to serialize event");
            return;
        }
    };

    rooms.broadcast(conversation_id, &payload).await;
    registry.send_to_users(recipient_ids, &payload).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_naming() {
        let event = ServerEvent::NotificationUnreadCount { count: 3 };
        assert_eq!(event.event_type(), "notification-unread-count");
    }

    #[test]
    fn test_payload_is_flat_with_type_and_timestamp() {
        let conversation_id = Uuid::new_v4();
        let reader_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();

        let event = ServerEvent::ConversationRead {
            conversation_id,
            reader_id,
            message_ids: vec![message_id],
            marked_count: 1,
        };

        let payload = event.to_payload_value().unwrap();
        assert_eq!(payload["type"], "conversation-read");
        assert!(payload["timestamp"].is_string());
        assert_eq!(payload["conversation_id"], conversation_id.to_string());
        assert_eq!(payload["reader_id"], reader_id.to_string());
        assert_eq!(payload["marked_count"], 1);
        assert_eq!(payload["message_ids"][0], message_id.to_string());
        // No nested "data" envelope
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn test_unread_count_payload() {
        let payload = ServerEvent::NotificationUnreadCount { count: 7 }
            .to_payload_value()
            .unwrap();
        assert_eq!(payload["count"], 7);
    }

    #[test]
    fn test_client_event_parsing() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"join-conversation","conversation_id":"{}"}}"#,
            conversation_id
        );
        match serde_json::from_str::<ClientEvent>(&raw) {
            Ok(ClientEvent::JoinConversation {
                conversation_id: parsed,
            }) => assert_eq!(parsed, conversation_id),
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_client_event_rejects_unknown_type() {
        let raw = r#"{"type":"drop-tables","conversation_id":"00000000-0000-0000-0000-000000000000"}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[tokio::test]
    async fn test_emit_to_user_reports_delivery() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let event = ServerEvent::NotificationUnreadCount { count: 1 };
        assert!(!emit_to_user(&registry, user_id, &event).await);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry.register(user_id, Uuid::new_v4(), tx).await;
        assert!(emit_to_user(&registry, user_id, &event).await);

        match rx.recv().await {
            Some(axum::extract::ws::Message::Text(text)) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value["type"], "notification-unread-count");
                assert_eq!(value["count"], 1);
            }
            other => panic!("expected text message, got {:?}", other),
        }
    }
}
