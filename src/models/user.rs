use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolved identity as returned by the user directory.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub role: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_admitted(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Public-facing participant fields used in conversation summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}
