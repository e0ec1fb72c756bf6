use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::MessageDto;
use super::user::UserProfile;

/// Derived listing view of a conversation. Computed from the message and
/// read-mark tables on every request, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub other_participant: UserProfile,
    pub last_message: Option<MessageDto>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    pub other_participant: UserProfile,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
