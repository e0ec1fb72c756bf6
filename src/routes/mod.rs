use crate::state::AppState;
use axum::middleware;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use serde_json::json;

pub mod conversations;
use conversations::{
    get_conversation, get_messages, list_conversations, mark_conversation_read, send_message,
    start_conversation,
};
pub mod notifications;
use notifications::{
    bulk_action, create_notification, delete_notification, get_notifications, get_preferences,
    get_unread_count, mark_all_read, mark_notification_read, mark_notification_unread,
    update_notification, update_preferences,
};

use crate::websocket::handler::ws_handler;

// Service introspection endpoint (plain JSON, no auth)
async fn metrics(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    let connected_users = state.registry.connected_users().await;
    let total_connections = state.registry.total_connections().await;
    json!({
        "service": "conversation-service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "connected_users": connected_users,
        "total_connections": total_connections,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
    .to_string()
}

pub fn build_router(state: AppState) -> Router {
    // Introspection endpoints stay public for healthchecks
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics));

    // API v1 endpoints behind bearer authentication
    let api_v1 = Router::new()
        // Conversations
        .route("/conversations", post(start_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/messages", get(get_messages))
        .route("/conversations/:id/messages", post(send_message))
        .route("/conversations/:id/read", post(mark_conversation_read))
        // Notifications
        .route("/notifications", get(get_notifications))
        .route("/notifications", post(create_notification))
        .route("/notifications/unread-count", get(get_unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/bulk", post(bulk_action))
        .route("/notifications/preferences", get(get_preferences))
        .route("/notifications/preferences", put(update_preferences))
        .route("/notifications/:id", put(update_notification))
        .route("/notifications/:id", delete(delete_notification))
        .route("/notifications/:id/read", put(mark_notification_read))
        .route("/notifications/:id/unread", put(mark_notification_unread))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // The websocket endpoint performs its own handshake authentication
    // (query-parameter credentials), so it sits outside the bearer layer.
    let ws = Router::new().route("/ws", get(ws_handler));

    let router = introspection.merge(Router::new().nest("/api/v1", api_v1.merge(ws)));

    crate::middleware::with_defaults(router).with_state(state)
}
