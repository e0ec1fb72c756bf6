use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{CreateNotificationRequest, NotificationPreferences, NotificationRecord};
use crate::services::notification_service::{BulkAction, NotificationService};
use crate::services::push;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GetNotificationsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub is_read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BulkActionRequest {
    pub action: String,
    pub ids: Vec<Uuid>,
}

/// GET /notifications
pub async fn get_notifications(
    State(state): State<AppState>,
    user: User,
    Query(params): Query<GetNotificationsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.clamp(1, 100);
    let page = NotificationService::list(&state.db, user.id, limit, params.offset).await?;

    Ok(Json(serde_json::json!({
        "notifications": page.notifications,
        "total": page.total,
        "unread_count": page.unread_count,
        "limit": limit,
        "offset": params.offset,
    })))
}

/// GET /notifications/unread-count
pub async fn get_unread_count(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationService::unread_count(&state.db, user.id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

/// POST /notifications
/// Any authenticated producer may create; the payload is validated against
/// the closed kind/priority enumerations before anything is written.
pub async fn create_notification(
    State(state): State<AppState>,
    _user: User,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationRecord>), AppError> {
    let notification = NotificationService::create(&state.db, payload).await?;

    push::notification_created(&state, &notification).await;

    Ok((StatusCode::CREATED, Json(notification)))
}

/// PUT /notifications/{id}
pub async fn update_notification(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNotificationRequest>,
) -> Result<Json<NotificationRecord>, AppError> {
    let notification = match payload.is_read {
        Some(true) => NotificationService::mark_read(&state.db, user.id, id).await?,
        Some(false) => NotificationService::mark_unread(&state.db, user.id, id).await?,
        None => NotificationService::get(&state.db, user.id, id).await?,
    };

    if payload.is_read.is_some() {
        push::notification_updated(&state, &notification).await;
    }

    Ok(Json(notification))
}

/// PUT /notifications/{id}/read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationRecord>, AppError> {
    let notification = NotificationService::mark_read(&state.db, user.id, id).await?;
    push::notification_updated(&state, &notification).await;
    Ok(Json(notification))
}

/// PUT /notifications/{id}/unread
pub async fn mark_notification_unread(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationRecord>, AppError> {
    let notification = NotificationService::mark_unread(&state.db, user.id, id).await?;
    push::notification_updated(&state, &notification).await;
    Ok(Json(notification))
}

/// PUT /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = NotificationService::mark_all_read(&state.db, user.id).await?;
    push::push_unread_count(&state, user.id).await;

    Ok(Json(serde_json::json!({
        "message": "All notifications marked as read",
        "count": count,
    })))
}

/// POST /notifications/bulk
pub async fn bulk_action(
    State(state): State<AppState>,
    user: User,
    Json(payload): Json<BulkActionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let action = BulkAction::parse(&payload.action).ok_or_else(|| {
        AppError::BadRequest(format!(
            "action must be one of mark_read, mark_unread, delete (got {:?})",
            payload.action
        ))
    })?;

    let count = NotificationService::bulk_action(&state.db, user.id, &payload.ids, action).await?;

    if action == BulkAction::Delete {
        for id in &payload.ids {
            push::notification_deleted(&state, user.id, *id).await;
        }
    } else {
        push::push_unread_count(&state, user.id).await;
    }

    Ok(Json(serde_json::json!({
        "action": payload.action,
        "count": count,
    })))
}

/// DELETE /notifications/{id}
pub async fn delete_notification(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    NotificationService::delete(&state.db, user.id, id).await?;
    push::notification_deleted(&state, user.id, id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /notifications/preferences
pub async fn get_preferences(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<NotificationPreferences>, AppError> {
    let prefs = NotificationService::get_or_create_preferences(&state.db, user.id).await?;
    Ok(Json(prefs))
}

/// PUT /notifications/preferences
/// Each toggle may be spelled camelCase or snake_case; both persist under
/// the canonical key.
pub async fn update_preferences(
    State(state): State<AppState>,
    user: User,
    Json(payload): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<NotificationPreferences>, AppError> {
    let prefs = NotificationService::update_preferences(&state.db, user.id, &payload).await?;
    Ok(Json(prefs))
}
