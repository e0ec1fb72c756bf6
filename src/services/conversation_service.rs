//! Two-party conversations and their derived summaries.
//!
//! Summaries are computed on every read from the message and read-mark
//! tables. There is no denormalized summary table to drift out of sync; if a
//! cache is ever added it must be invalidated by the same write path.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ConversationDetail, ConversationSummary, MessageDto, MessageRecord, UserProfile,
};
use crate::services::directory::DirectoryService;
use crate::services::read_receipts::ReadReceiptService;

/// Result of the idempotent start operation.
pub struct StartedConversation {
    pub conversation_id: Uuid,
    pub created: bool,
    pub first_message: Option<MessageRecord>,
}

pub struct ConversationService;

impl ConversationService {
    /// Find the existing conversation holding exactly the {a, b} participant
    /// pair, in either order.
    pub async fn find_for_pair(db: &PgPool, a: Uuid, b: Uuid) -> Result<Option<Uuid>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT cp.conversation_id
            FROM conversation_participants cp
            JOIN conversation_participants cq
              ON cq.conversation_id = cp.conversation_id AND cq.user_id = $2
            WHERE cp.user_id = $1
              AND (
                SELECT COUNT(*) FROM conversation_participants cc
                WHERE cc.conversation_id = cp.conversation_id
              ) = 2
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| r.get("conversation_id")))
    }

    /// Start (or reuse) a conversation between `creator` and `other`.
    ///
    /// Idempotent: the same pair in either order yields the same conversation
    /// id. The optional first message is inserted in the same transaction as
    /// the `updated_at` bump.
    pub async fn start_conversation(
        db: &PgPool,
        creator: Uuid,
        other: Uuid,
        first_message: Option<&str>,
    ) -> Result<StartedConversation, AppError> {
        if creator == other {
            return Err(AppError::BadRequest(
                "cannot start a conversation with yourself".into(),
            ));
        }
        // The other participant must exist in the directory
        DirectoryService::resolve(db, other).await?;

        let existing = Self::find_for_pair(db, creator, other).await?;
        let (conversation_id, created) = match existing {
            Some(id) => (id, false),
            None => (Uuid::new_v4(), true),
        };

        let mut tx = db.begin().await?;

        if created {
            sqlx::query("INSERT INTO conversations (id) VALUES ($1)")
                .bind(conversation_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2), ($1, $3)",
            )
            .bind(conversation_id)
            .bind(creator)
            .bind(other)
            .execute(&mut *tx)
            .await?;
        }

        let first_message = match first_message {
            Some(body) => {
                let record =
                    Self::insert_message(&mut tx, conversation_id, creator, body).await?;
                Some(record)
            }
            None => None,
        };

        tx.commit().await?;

        Ok(StartedConversation {
            conversation_id,
            created,
            first_message,
        })
    }

    /// Insert a message and bump the conversation's `updated_at` inside an
    /// open transaction. Content is validated by the message service before
    /// this point.
    pub(crate) async fn insert_message(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<MessageRecord, AppError> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING created_at
            "#,
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&mut **tx)
        .await?;
        let created_at: DateTime<Utc> = row.get("created_at");

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut **tx)
            .await?;

        Ok(MessageRecord {
            id,
            conversation_id,
            sender_id,
            body: body.to_string(),
            created_at,
        })
    }

    pub async fn is_participant(
        db: &PgPool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    pub async fn participants(db: &PgPool, conversation_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1 ORDER BY joined_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("user_id")).collect())
    }

    /// Participants other than `user_id`; the push targets for broadcasts.
    pub async fn other_participants(
        db: &PgPool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let all = Self::participants(db, conversation_id).await?;
        Ok(all.into_iter().filter(|id| *id != user_id).collect())
    }

    /// Paginated, searchable conversation summaries for a user's inbox.
    ///
    /// For every conversation the user participates in: the other
    /// participant's profile, the most recent message, and the count of
    /// messages the user has not read. A search term matches any message
    /// body in the conversation or the other participant's username,
    /// display name, or email, case-insensitively.
    pub async fn list_summaries(
        db: &PgPool,
        user_id: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let pattern = search.map(|s| format!("%{}%", escape_like(s)));

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.updated_at,
                   u.id AS other_id, u.username, u.display_name, u.email
            FROM conversations c
            JOIN conversation_participants me
              ON me.conversation_id = c.id AND me.user_id = $1
            JOIN conversation_participants them
              ON them.conversation_id = c.id AND them.user_id <> $1
            JOIN users u ON u.id = them.user_id
            WHERE $2::text IS NULL
               OR u.username ILIKE $2
               OR u.display_name ILIKE $2
               OR u.email ILIKE $2
               OR EXISTS (
                 SELECT 1 FROM messages m
                 WHERE m.conversation_id = c.id AND m.body ILIKE $2
               )
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(db)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let conversation_id: Uuid = row.get("id");
            let other = UserProfile {
                id: row.get("other_id"),
                username: row.get("username"),
                display_name: row.try_get("display_name").ok(),
                email: row.try_get("email").ok(),
            };

            let last_message = Self::last_message(db, conversation_id, user_id).await?;
            let unread_count =
                ReadReceiptService::unread_count(db, user_id, conversation_id).await?;

            summaries.push(ConversationSummary {
                id: conversation_id,
                other_participant: other,
                last_message,
                unread_count,
                updated_at: row.get("updated_at"),
            });
        }

        Ok(summaries)
    }

    async fn last_message(
        db: &PgPool,
        conversation_id: Uuid,
        requester: Uuid,
    ) -> Result<Option<MessageDto>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.sender_id, m.body, m.created_at,
                   (m.sender_id = $2 OR EXISTS (
                     SELECT 1 FROM message_reads r
                     WHERE r.message_id = m.id AND r.user_id = $2
                   )) AS read
            FROM messages m
            WHERE m.conversation_id = $1
            ORDER BY m.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .bind(requester)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| {
            let created_at: DateTime<Utc> = r.get("created_at");
            MessageDto {
                id: r.get("id"),
                conversation_id: r.get("conversation_id"),
                sender_id: r.get("sender_id"),
                body: r.get("body"),
                created_at: created_at.to_rfc3339(),
                read: r.get("read"),
            }
        }))
    }

    /// Detail view for one conversation. Fails with `NotFound` when the
    /// requester is not a participant; existence is not distinguished from
    /// non-membership.
    pub async fn get_detail(
        db: &PgPool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDetail, AppError> {
        if !Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::NotFound);
        }

        let row = sqlx::query("SELECT created_at, updated_at FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;

        let participant_ids = Self::participants(db, conversation_id).await?;
        let other_id = participant_ids
            .iter()
            .copied()
            .find(|id| *id != user_id)
            .ok_or(AppError::Internal)?;
        let other = DirectoryService::profile(db, other_id).await?;
        let unread_count = ReadReceiptService::unread_count(db, user_id, conversation_id).await?;

        Ok(ConversationDetail {
            id: conversation_id,
            participant_ids,
            other_participant: other,
            unread_count,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// Escape LIKE metacharacters so search terms match literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_metacharacters() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }
}
