use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{MessageDto, MessageRecord};
use crate::services::conversation_service::ConversationService;

pub const MAX_MESSAGE_LEN: usize = 4000;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamp a client-requested page size to the server-side bounds.
pub fn clamp_page_size(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

pub struct MessageService;

impl MessageService {
    /// Validate message content: non-empty after trimming, bounded length.
    pub fn validate_body(body: &str) -> Result<&str, AppError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(AppError::BadRequest("message body cannot be empty".into()));
        }
        if trimmed.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::BadRequest(format!(
                "message body exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }
        Ok(trimmed)
    }

    /// Persist a message from a verified participant. The insert and the
    /// conversation `updated_at` bump commit together; the caller emits
    /// events only after this returns.
    pub async fn send_message(
        db: &PgPool,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<MessageRecord, AppError> {
        if !ConversationService::is_participant(db, conversation_id, sender_id).await? {
            return Err(AppError::NotFound);
        }
        let body = Self::validate_body(body)?;

        let mut tx = db.begin().await?;
        let record =
            ConversationService::insert_message(&mut tx, conversation_id, sender_id, body).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Message history, newest first, offset/limit paginated with the
    /// server-side page bounds. Non-participants get `NotFound`.
    pub async fn get_messages(
        db: &PgPool,
        conversation_id: Uuid,
        user_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<MessageDto>, AppError> {
        if !ConversationService::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::NotFound);
        }

        let limit = clamp_page_size(limit);
        let offset = offset.max(0);

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.sender_id, m.body, m.created_at,
                   (m.sender_id = $2 OR EXISTS (
                     SELECT 1 FROM message_reads r
                     WHERE r.message_id = m.id AND r.user_id = $2
                   )) AS read
            FROM messages m
            WHERE m.conversation_id = $1
            ORDER BY m.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let out = rows
            .into_iter()
            .map(|r| {
                let created_at: DateTime<Utc> = r.get("created_at");
                MessageDto {
                    id: r.get("id"),
                    conversation_id: r.get("conversation_id"),
                    sender_id: r.get("sender_id"),
                    body: r.get("body"),
                    created_at: created_at.to_rfc3339(),
                    read: r.get("read"),
                }
            })
            .collect();

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_size_defaults() {
        assert_eq!(clamp_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(-5)), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_clamp_page_size_caps_at_maximum() {
        assert_eq!(clamp_page_size(Some(25)), 25);
        assert_eq!(clamp_page_size(Some(MAX_PAGE_SIZE)), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(10_000)), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_validate_body_rejects_empty() {
        assert!(MessageService::validate_body("").is_err());
        assert!(MessageService::validate_body("   \n\t ").is_err());
    }

    #[test]
    fn test_validate_body_trims() {
        assert_eq!(MessageService::validate_body("  hi  ").unwrap(), "hi");
    }

    #[test]
    fn test_validate_body_enforces_bound() {
        let at_limit = "a".repeat(MAX_MESSAGE_LEN);
        assert!(MessageService::validate_body(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_MESSAGE_LEN + 1);
        assert!(MessageService::validate_body(&over_limit).is_err());
    }
}
