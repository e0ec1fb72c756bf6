use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification type enumeration. Closed set: any other value is rejected
/// before a row is written.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// New message in a conversation
    Message,
    /// Platform/system announcement
    System,
    /// Moderation decision affecting the recipient
    Moderation,
    /// Account-level event (security, profile)
    Account,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Message => "message",
            NotificationKind::System => "system",
            NotificationKind::Moderation => "moderation",
            NotificationKind::Account => "account",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "message" => Some(NotificationKind::Message),
            "system" => Some(NotificationKind::System),
            "moderation" => Some(NotificationKind::Moderation),
            "account" => Some(NotificationKind::Account),
            _ => None,
        }
    }

    /// Preference category this kind is gated by.
    pub fn preference_category(&self) -> &'static str {
        match self {
            NotificationKind::Message => "messages",
            NotificationKind::System | NotificationKind::Account => "system",
            NotificationKind::Moderation => "moderation",
        }
    }
}

/// Notification priority level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(NotificationPriority::Low),
            "normal" => Some(NotificationPriority::Normal),
            "high" => Some(NotificationPriority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a notification. `kind` and `priority` arrive as strings
/// from producers and are validated against the closed enumerations.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// Per-user delivery toggles, one row per user, lazily created with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub email_messages: bool,
    pub email_system: bool,
    pub email_moderation: bool,
    pub push_messages: bool,
    pub push_system: bool,
    pub push_moderation: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    pub fn email_enabled_for(&self, kind: NotificationKind) -> bool {
        match kind.preference_category() {
            "messages" => self.email_messages,
            "moderation" => self.email_moderation,
            _ => self.email_system,
        }
    }

    pub fn push_enabled_for(&self, kind: NotificationKind) -> bool {
        match kind.preference_category() {
            "messages" => self.push_messages,
            "moderation" => self.push_moderation,
            _ => self.push_system,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_known_values() {
        assert_eq!(
            NotificationKind::parse("message"),
            Some(NotificationKind::Message)
        );
        assert_eq!(
            NotificationKind::parse("system"),
            Some(NotificationKind::System)
        );
        assert_eq!(
            NotificationKind::parse("moderation"),
            Some(NotificationKind::Moderation)
        );
        assert_eq!(
            NotificationKind::parse("account"),
            Some(NotificationKind::Account)
        );
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!(NotificationKind::parse("like"), None);
        assert_eq!(NotificationKind::parse("MESSAGE"), None);
        assert_eq!(NotificationKind::parse(""), None);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(
            NotificationPriority::parse("low"),
            Some(NotificationPriority::Low)
        );
        assert_eq!(
            NotificationPriority::parse("normal"),
            Some(NotificationPriority::Normal)
        );
        assert_eq!(
            NotificationPriority::parse("high"),
            Some(NotificationPriority::High)
        );
        assert_eq!(NotificationPriority::parse("urgent"), None);
    }

    #[test]
    fn test_kind_round_trips_through_as_str() {
        for kind in [
            NotificationKind::Message,
            NotificationKind::System,
            NotificationKind::Moderation,
            NotificationKind::Account,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_preference_gating_by_category() {
        let prefs = NotificationPreferences {
            user_id: Uuid::new_v4(),
            email_messages: false,
            email_system: true,
            email_moderation: true,
            push_messages: true,
            push_system: false,
            push_moderation: true,
            updated_at: Utc::now(),
        };

        assert!(!prefs.email_enabled_for(NotificationKind::Message));
        assert!(prefs.email_enabled_for(NotificationKind::System));
        assert!(prefs.push_enabled_for(NotificationKind::Message));
        assert!(!prefs.push_enabled_for(NotificationKind::Account));
        assert!(prefs.push_enabled_for(NotificationKind::Moderation));
    }
}
