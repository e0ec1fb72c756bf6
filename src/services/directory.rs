//! User directory collaborator.
//!
//! Identity and profile lookups against the users table. The handshake
//! authenticator consults this before admitting a connection; the
//! conversation aggregator uses it for participant display fields.

use crate::error::AppError;
use crate::models::{Identity, UserProfile};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct DirectoryService;

impl DirectoryService {
    pub async fn resolve(db: &PgPool, user_id: Uuid) -> Result<Identity, AppError> {
        let row = sqlx::query("SELECT id, role, is_active, deleted_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(Identity {
            id: row.get("id"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            deleted_at: row.try_get("deleted_at").ok(),
        })
    }

    /// Resolve an identity and require it to be admitted (active and not
    /// soft-deleted). Used by the handshake authenticator: any failure here
    /// refuses the connection before registry state exists.
    pub async fn require_active(db: &PgPool, user_id: Uuid) -> Result<Identity, AppError> {
        let identity = match Self::resolve(db, user_id).await {
            Ok(identity) => identity,
            Err(AppError::NotFound) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !identity.is_admitted() {
            return Err(AppError::Unauthorized);
        }
        Ok(identity)
    }

    pub async fn profile(db: &PgPool, user_id: Uuid) -> Result<UserProfile, AppError> {
        let row =
            sqlx::query("SELECT id, username, display_name, email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(db)
                .await?
                .ok_or(AppError::NotFound)?;

        Ok(UserProfile {
            id: row.get("id"),
            username: row.get("username"),
            display_name: row.try_get("display_name").ok(),
            email: row.try_get("email").ok(),
        })
    }
}
