use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Wire shape for a message. `read` is computed for the requesting user:
/// senders are implicitly read, everyone else needs a read-mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: String,
    pub read: bool,
}

impl MessageRecord {
    pub fn into_dto(self, requester: Uuid) -> MessageDto {
        let read = self.sender_id == requester;
        MessageDto {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            body: self.body,
            created_at: self.created_at.to_rfc3339(),
            read,
        }
    }
}
