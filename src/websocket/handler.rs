//! WebSocket admission and the per-connection event loop.
//!
//! A connection is admitted only after its credential verifies and the
//! resolved identity is active and not soft-deleted; no partial state is
//! created for refused connections. On success the connection is bound in
//! the registry for the lifetime of the socket, and on disconnect every
//! room it joined is left before the binding is removed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{principal_from_claims, verify_jwt, AuthUser};
use crate::services::conversation_service::ConversationService;
use crate::services::directory::DirectoryService;
use crate::state::AppState;
use crate::websocket::events::{ClientEvent, ServerEvent};
use crate::websocket::registry::ConnectionSender;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub auth: Option<String>,
    pub token: Option<String>,
}

/// Extract the handshake credential. Priority order: explicit `auth` field,
/// `token` query parameter, Authorization header.
fn extract_credential(params: &WsParams, headers: &HeaderMap) -> Option<String> {
    params
        .auth
        .clone()
        .or_else(|| params.token.clone())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string())
        })
}

/// Validate the credential and resolve the identity before admission.
async fn authenticate(
    state: &AppState,
    params: &WsParams,
    headers: &HeaderMap,
) -> Result<AuthUser, AppError> {
    let token = extract_credential(params, headers).ok_or(AppError::Unauthorized)?;
    let claims = verify_jwt(&token, &state.config.jwt_secret)?;
    let principal = principal_from_claims(claims)?;
    // The identity must exist, be active, and not be soft-deleted
    let identity = DirectoryService::require_active(&state.db, principal.id).await?;
    Ok(AuthUser {
        id: identity.id,
        role: identity.role,
    })
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Refuse before upgrade on any authentication failure
    let user = match authenticate(&state, &params, &headers).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "websocket connection refused");
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: AuthUser, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // Bind only after successful admission; the binding is all-or-nothing
    state.registry.register(user.id, connection_id, tx.clone()).await;
    tracing::info!(user_id = %user.id, connection_id = %connection_id, role = %user.role,
        "websocket connection established");

    let hello = ServerEvent::ConnectionEstablished {
        connection_id,
        user_id: user.id,
    };
    match hello.to_payload() {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload));
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize connection event"),
    }

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Outgoing events fanned in from registry and rooms
            maybe = rx.recv() => {
                match maybe {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Incoming client events
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_event(&state, &user, connection_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    // Disconnect: leave every joined room, then drop the binding. In-flight
    // store operations complete on their own; their sends become no-ops.
    state.rooms.leave_all(connection_id).await;
    state.registry.unregister(user.id, connection_id).await;
    tracing::info!(user_id = %user.id, connection_id = %connection_id, "websocket disconnected");
}

async fn handle_client_event(
    state: &AppState,
    user: &AuthUser,
    connection_id: Uuid,
    tx: &ConnectionSender,
    text: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            send_ack(
                tx,
                serde_json::json!({ "ok": false, "error": "unrecognized event" }),
            );
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            // Re-validate membership against the store before joining
            match ConversationService::is_participant(&state.db, conversation_id, user.id).await {
                Ok(true) => {
                    state
                        .rooms
                        .join(connection_id, conversation_id, tx.clone())
                        .await;
                    send_ack(
                        tx,
                        serde_json::json!({
                            "type": "join-conversation",
                            "ok": true,
                            "conversation_id": conversation_id,
                        }),
                    );
                }
                Ok(false) => {
                    // Non-membership reads the same as a nonexistent id
                    send_ack(
                        tx,
                        serde_json::json!({
                            "type": "join-conversation",
                            "ok": false,
                            "error": "conversation not found",
                        }),
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, conversation_id = %conversation_id,
                        "membership check failed");
                    send_ack(
                        tx,
                        serde_json::json!({
                            "type": "join-conversation",
                            "ok": false,
                            "error": "membership check failed",
                        }),
                    );
                }
            }
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            state.rooms.leave(connection_id, conversation_id).await;
            send_ack(
                tx,
                serde_json::json!({
                    "type": "leave-conversation",
                    "ok": true,
                    "conversation_id": conversation_id,
                }),
            );
        }
    }
}

fn send_ack(tx: &ConnectionSender, payload: serde_json::Value) {
    let _ = tx.send(Message::Text(payload.to_string()));
}
