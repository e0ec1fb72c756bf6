use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject - the user id
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: i64, // expiration time (unix timestamp)
}

fn default_role() -> String {
    "user".to_string()
}

/// Authenticated principal carried in request extensions for the lifetime of
/// a request (or of a websocket connection).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

/// Validate a bearer token and extract claims (HS256)
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Turn verified claims into an `AuthUser`; the subject must be a UUID.
pub fn principal_from_claims(claims: Claims) -> Result<AuthUser, AppError> {
    let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
    Ok(AuthUser {
        id,
        role: claims.role,
    })
}

/// Middleware to extract the bearer token and stash the principal in
/// request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let principal = principal_from_claims(claims)?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, role: &str, secret: &str, exp: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = token_for(&user_id.to_string(), "user", "s3cret", far_future());

        let claims = verify_jwt(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "user");

        let principal = principal_from_claims(claims).unwrap();
        assert_eq!(principal.id, user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = token_for(&Uuid::new_v4().to_string(), "user", "s3cret", far_future());
        assert!(matches!(
            verify_jwt(&token, "other-secret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = chrono::Utc::now().timestamp() - 3600;
        let token = token_for(&Uuid::new_v4().to_string(), "user", "s3cret", expired);
        assert!(matches!(
            verify_jwt(&token, "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let token = token_for("not-a-uuid", "user", "s3cret", far_future());
        let claims = verify_jwt(&token, "s3cret").unwrap();
        assert!(matches!(
            principal_from_claims(claims),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            verify_jwt("definitely.not.a.jwt", "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }
}
