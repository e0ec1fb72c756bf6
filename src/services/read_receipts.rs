//! Durable, idempotent per-(message, user) read markers.
//!
//! A message counts as read for a user when the user is its sender or a
//! read-mark row exists; sender status is never persisted as a mark. The
//! tracker has no push responsibility: the calling layer broadcasts read
//! events after a successful marking pass.

use crate::error::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct ReadReceiptService;

impl ReadReceiptService {
    /// Mark every unread message in a conversation as read by `user_id`.
    ///
    /// Computes the set of messages not sent by the reader that lack a mark,
    /// then bulk-inserts exactly that difference. Concurrent calls can race;
    /// duplicate-key conflicts are absorbed by ON CONFLICT DO NOTHING while
    /// any other error propagates.
    ///
    /// Returns the newly marked message ids (empty on a repeat call).
    pub async fn mark_conversation_read(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id
            FROM messages m
            WHERE m.conversation_id = $1
              AND m.sender_id <> $2
              AND NOT EXISTS (
                SELECT 1 FROM message_reads r
                WHERE r.message_id = m.id AND r.user_id = $2
              )
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let unread_ids: Vec<Uuid> = rows.into_iter().map(|r| r.get("id")).collect();
        if unread_ids.is_empty() {
            return Ok(unread_ids);
        }

        sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            SELECT unnest($1::uuid[]), $2
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(&unread_ids)
        .bind(user_id)
        .execute(db)
        .await?;

        Ok(unread_ids)
    }

    /// Count messages in a conversation not sent by `user_id` that lack a
    /// read-mark for `user_id`.
    pub async fn unread_count(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)::bigint
            FROM messages m
            WHERE m.conversation_id = $1
              AND m.sender_id <> $2
              AND NOT EXISTS (
                SELECT 1 FROM message_reads r
                WHERE r.message_id = m.id AND r.user_id = $2
              )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        Ok(count)
    }
}
