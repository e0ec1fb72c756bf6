//! Authorization guards that enforce permission checks at the type level

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Represents an authenticated user extracted from JWT claims
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub role: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the auth middleware
        let principal = parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)?;

        Ok(User {
            id: principal.id,
            role: principal.role,
        })
    }
}

/// A verified participant of a conversation.
///
/// Non-participants receive `NotFound`, indistinguishable from a nonexistent
/// conversation id, so conversation existence never leaks.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
}

impl Participant {
    pub async fn verify(
        db: &PgPool,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let row = sqlx::query(
            "SELECT 1 AS present FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        match row {
            Some(_) => Ok(Participant {
                user_id,
                conversation_id,
            }),
            None => Err(AppError::NotFound),
        }
    }
}
