//! Notification persistence and the authoritative unread counter.
//!
//! Every mutation is scoped to `recipient = caller`; touching another user's
//! notification is indistinguishable from "not found". Unread counts are
//! always recomputed with a fresh count query, never maintained by
//! increments, so missed events cannot cause drift.

use once_cell::sync::Lazy;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CreateNotificationRequest, NotificationKind, NotificationPreferences, NotificationPriority,
    NotificationRecord,
};

/// Canonical preference keys and the accepted input spellings for each.
/// Clients may send either camelCase or snake_case; both resolve to one
/// canonical column at the boundary instead of scattered conditionals.
const PREFERENCE_KEYS: &[(&str, &[&str])] = &[
    ("email_messages", &["email_messages", "emailMessages"]),
    ("email_system", &["email_system", "emailSystem"]),
    ("email_moderation", &["email_moderation", "emailModeration"]),
    ("push_messages", &["push_messages", "pushMessages"]),
    ("push_system", &["push_system", "pushSystem"]),
    ("push_moderation", &["push_moderation", "pushModeration"]),
];

static PREFERENCE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (canonical, accepted) in PREFERENCE_KEYS {
        for alias in *accepted {
            map.insert(*alias, *canonical);
        }
    }
    map
});

/// Resolve an input preference key to its canonical spelling.
pub fn resolve_preference_key(key: &str) -> Option<&'static str> {
    PREFERENCE_ALIASES.get(key).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    MarkRead,
    MarkUnread,
    Delete,
}

impl BulkAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mark_read" => Some(BulkAction::MarkRead),
            "mark_unread" => Some(BulkAction::MarkUnread),
            "delete" => Some(BulkAction::Delete),
            _ => None,
        }
    }
}

pub struct NotificationPage {
    pub notifications: Vec<NotificationRecord>,
    pub total: i64,
    pub unread_count: i64,
}

pub struct NotificationService;

impl NotificationService {
    fn record_from_row(row: &PgRow) -> Result<NotificationRecord, AppError> {
        let kind_str: String = row.get("kind");
        let priority_str: String = row.get("priority");
        // Stored values come from the closed enumerations; an unknown value
        // here means the table was written outside this service.
        let kind = NotificationKind::parse(&kind_str).ok_or(AppError::Internal)?;
        let priority = NotificationPriority::parse(&priority_str).ok_or(AppError::Internal)?;

        Ok(NotificationRecord {
            id: row.get("id"),
            recipient_id: row.get("recipient_id"),
            kind,
            priority,
            title: row.get("title"),
            body: row.get("body"),
            data: row.try_get("data").ok(),
            action_url: row.try_get("action_url").ok(),
            action_text: row.try_get("action_text").ok(),
            is_read: row.get("is_read"),
            read_at: row.try_get("read_at").ok(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    const RETURNING: &'static str = "id, recipient_id, kind, priority, title, body, data, \
         action_url, action_text, is_read, read_at, created_at, updated_at";

    /// Validate and persist a notification. `kind` and `priority` must be
    /// members of their closed enumerations; anything else fails before any
    /// write occurs. Live push happens in the calling layer after this
    /// returns.
    pub async fn create(
        db: &PgPool,
        req: CreateNotificationRequest,
    ) -> Result<NotificationRecord, AppError> {
        let kind = NotificationKind::parse(&req.kind).ok_or_else(|| {
            AppError::BadRequest(format!(
                "kind must be one of message, system, moderation, account (got {:?})",
                req.kind
            ))
        })?;
        let priority = NotificationPriority::parse(&req.priority).ok_or_else(|| {
            AppError::BadRequest(format!(
                "priority must be one of low, normal, high (got {:?})",
                req.priority
            ))
        })?;
        if req.title.trim().is_empty() {
            return Err(AppError::BadRequest("title cannot be empty".into()));
        }
        if req.message.trim().is_empty() {
            return Err(AppError::BadRequest("message cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let query = format!(
            r#"
            INSERT INTO notifications
                (id, recipient_id, kind, priority, title, body, data, action_url, action_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            Self::RETURNING
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(req.recipient_id)
            .bind(kind.as_str())
            .bind(priority.as_str())
            .bind(req.title.trim())
            .bind(req.message.trim())
            .bind(&req.data)
            .bind(&req.action_url)
            .bind(&req.action_text)
            .fetch_one(db)
            .await?;

        let record = Self::record_from_row(&row)?;
        tracing::info!(notification_id = %record.id, recipient_id = %record.recipient_id,
            kind = kind.as_str(), "notification created");
        Ok(record)
    }

    pub async fn list(
        db: &PgPool,
        recipient_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<NotificationPage, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            Self::RETURNING
        );
        let rows = sqlx::query(&query)
            .bind(recipient_id)
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(db)
            .await?;

        let notifications = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*)::bigint FROM notifications WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_one(db)
                .await?;
        let unread_count = Self::unread_count(db, recipient_id).await?;

        Ok(NotificationPage {
            notifications,
            total,
            unread_count,
        })
    }

    /// A single notification, visible only to its recipient.
    pub async fn get(
        db: &PgPool,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<NotificationRecord, AppError> {
        let query = format!(
            "SELECT {} FROM notifications WHERE id = $1 AND recipient_id = $2",
            Self::RETURNING
        );
        let row = sqlx::query(&query)
            .bind(notification_id)
            .bind(recipient_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        Self::record_from_row(&row)
    }

    /// Authoritative unread counter: always a fresh count query.
    pub async fn unread_count(db: &PgPool, recipient_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Set the read flag and stamp `read_at` exactly once. Re-marking an
    /// already-read notification is a no-op, not an error.
    pub async fn mark_read(
        db: &PgPool,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<NotificationRecord, AppError> {
        let query = format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE,
                read_at = COALESCE(read_at, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND recipient_id = $2
            RETURNING {}
            "#,
            Self::RETURNING
        );
        let row = sqlx::query(&query)
            .bind(notification_id)
            .bind(recipient_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        Self::record_from_row(&row)
    }

    /// Clear the read flag and its timestamp.
    pub async fn mark_unread(
        db: &PgPool,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<NotificationRecord, AppError> {
        let query = format!(
            r#"
            UPDATE notifications
            SET is_read = FALSE, read_at = NULL, updated_at = NOW()
            WHERE id = $1 AND recipient_id = $2
            RETURNING {}
            "#,
            Self::RETURNING
        );
        let row = sqlx::query(&query)
            .bind(notification_id)
            .bind(recipient_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;
        Self::record_from_row(&row)
    }

    pub async fn mark_all_read(db: &PgPool, recipient_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE,
                read_at = COALESCE(read_at, NOW()),
                updated_at = NOW()
            WHERE recipient_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(recipient_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Apply one action to a set of the caller's notifications. Ids that do
    /// not belong to the caller are simply not matched.
    pub async fn bulk_action(
        db: &PgPool,
        recipient_id: Uuid,
        ids: &[Uuid],
        action: BulkAction,
    ) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = match action {
            BulkAction::MarkRead => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET is_read = TRUE, read_at = COALESCE(read_at, NOW()), updated_at = NOW()
                    WHERE recipient_id = $1 AND id = ANY($2)
                    "#,
                )
                .bind(recipient_id)
                .bind(ids)
                .execute(db)
                .await?
            }
            BulkAction::MarkUnread => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET is_read = FALSE, read_at = NULL, updated_at = NOW()
                    WHERE recipient_id = $1 AND id = ANY($2)
                    "#,
                )
                .bind(recipient_id)
                .bind(ids)
                .execute(db)
                .await?
            }
            BulkAction::Delete => {
                sqlx::query("DELETE FROM notifications WHERE recipient_id = $1 AND id = ANY($2)")
                    .bind(recipient_id)
                    .bind(ids)
                    .execute(db)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    pub async fn delete(
        db: &PgPool,
        recipient_id: Uuid,
        notification_id: Uuid,
    ) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(notification_id)
            .bind(recipient_id)
            .execute(db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Preferences are created lazily with defaults on first access.
    pub async fn get_or_create_preferences(
        db: &PgPool,
        user_id: Uuid,
    ) -> Result<NotificationPreferences, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING user_id, email_messages, email_system, email_moderation,
                      push_messages, push_system, push_moderation, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;

        Ok(Self::preferences_from_row(&row))
    }

    fn preferences_from_row(row: &PgRow) -> NotificationPreferences {
        NotificationPreferences {
            user_id: row.get("user_id"),
            email_messages: row.get("email_messages"),
            email_system: row.get("email_system"),
            email_moderation: row.get("email_moderation"),
            push_messages: row.get("push_messages"),
            push_system: row.get("push_system"),
            push_moderation: row.get("push_moderation"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Apply preference updates given as `key -> bool`, where each key may be
    /// spelled camelCase or snake_case. Unknown keys or non-boolean values
    /// are rejected before anything is written.
    pub async fn update_preferences(
        db: &PgPool,
        user_id: Uuid,
        updates: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<NotificationPreferences, AppError> {
        let mut resolved: Vec<(&'static str, bool)> = Vec::with_capacity(updates.len());
        for (key, value) in updates {
            let canonical = resolve_preference_key(key)
                .ok_or_else(|| AppError::BadRequest(format!("unknown preference {:?}", key)))?;
            let enabled = value
                .as_bool()
                .ok_or_else(|| AppError::BadRequest(format!("{} must be a boolean", canonical)))?;
            resolved.push((canonical, enabled));
        }

        let mut prefs = Self::get_or_create_preferences(db, user_id).await?;
        for (canonical, enabled) in &resolved {
            match *canonical {
                "email_messages" => prefs.email_messages = *enabled,
                "email_system" => prefs.email_system = *enabled,
                "email_moderation" => prefs.email_moderation = *enabled,
                "push_messages" => prefs.push_messages = *enabled,
                "push_system" => prefs.push_system = *enabled,
                "push_moderation" => prefs.push_moderation = *enabled,
                _ => unreachable!("alias table only yields canonical keys"),
            }
        }

        let row = sqlx::query(
            r#"
            UPDATE notification_preferences
            SET email_messages = $2, email_system = $3, email_moderation = $4,
                push_messages = $5, push_system = $6, push_moderation = $7,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, email_messages, email_system, email_moderation,
                      push_messages, push_system, push_moderation, updated_at
            "#,
        )
        .bind(user_id)
        .bind(prefs.email_messages)
        .bind(prefs.email_system)
        .bind(prefs.email_moderation)
        .bind(prefs.push_messages)
        .bind(prefs.push_system)
        .bind(prefs.push_moderation)
        .fetch_one(db)
        .await?;

        Ok(Self::preferences_from_row(&row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_table_accepts_both_spellings() {
        assert_eq!(
            resolve_preference_key("email_messages"),
            Some("email_messages")
        );
        assert_eq!(
            resolve_preference_key("emailMessages"),
            Some("email_messages")
        );
        assert_eq!(
            resolve_preference_key("pushModeration"),
            Some("push_moderation")
        );
        assert_eq!(
            resolve_preference_key("push_moderation"),
            Some("push_moderation")
        );
    }

    #[test]
    fn test_alias_table_rejects_unknown_keys() {
        assert_eq!(resolve_preference_key("smsMessages"), None);
        assert_eq!(resolve_preference_key("EMAIL_MESSAGES"), None);
        assert_eq!(resolve_preference_key(""), None);
    }

    #[test]
    fn test_every_canonical_key_resolves_to_itself() {
        for (canonical, _) in PREFERENCE_KEYS {
            assert_eq!(resolve_preference_key(canonical), Some(*canonical));
        }
    }

    #[test]
    fn test_bulk_action_parse() {
        assert_eq!(BulkAction::parse("mark_read"), Some(BulkAction::MarkRead));
        assert_eq!(
            BulkAction::parse("mark_unread"),
            Some(BulkAction::MarkUnread)
        );
        assert_eq!(BulkAction::parse("delete"), Some(BulkAction::Delete));
        assert_eq!(BulkAction::parse("archive"), None);
    }
}
