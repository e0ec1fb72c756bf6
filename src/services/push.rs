//! Live delivery half of the notification fan-out pipeline.
//!
//! Everything here runs after the authoritative write has committed and is
//! best-effort: a recipient with no connections, a closed channel, or a
//! failed count query is logged and swallowed, never surfaced to the caller
//! of the triggering operation. Unread counters are pushed as fresh
//! recomputed counts, after the mutation that caused them.

use uuid::Uuid;

use crate::models::{
    CreateNotificationRequest, MessageDto, MessageRecord, NotificationKind, NotificationRecord,
};
use crate::services::conversation_service::ConversationService;
use crate::services::notification_service::NotificationService;
use crate::services::read_receipts::ReadReceiptService;
use crate::state::AppState;
use crate::websocket::events::{emit_to_conversation, emit_to_user, ServerEvent};

/// Fan a freshly persisted message out: `conversation-message` to the room
/// and to every other participant's user channel, then a per-recipient
/// `conversation-updated` with a recomputed unread count, then a best-effort
/// message notification.
pub async fn message_created(state: &AppState, record: &MessageRecord) {
    let recipients = match ConversationService::other_participants(
        &state.db,
        record.conversation_id,
        record.sender_id,
    )
    .await
    {
        Ok(recipients) => recipients,
        Err(e) => {
            tracing::warn!(error = %e, conversation_id = %record.conversation_id,
                "failed to load recipients for message fan-out");
            return;
        }
    };

    let message = MessageDto {
        id: record.id,
        conversation_id: record.conversation_id,
        sender_id: record.sender_id,
        body: record.body.clone(),
        created_at: record.created_at.to_rfc3339(),
        read: false,
    };

    let event = ServerEvent::ConversationMessage {
        conversation_id: record.conversation_id,
        message: message.clone(),
        sender_id: record.sender_id,
    };
    emit_to_conversation(
        &state.rooms,
        &state.registry,
        record.conversation_id,
        &recipients,
        &event,
    )
    .await;

    for recipient in &recipients {
        let unread_count =
            match ReadReceiptService::unread_count(&state.db, *recipient, record.conversation_id)
                .await
            {
                Ok(count) => Some(count),
                Err(e) => {
                    tracing::warn!(error = %e, recipient = %recipient,
                        "failed to recompute conversation unread count");
                    None
                }
            };
        let updated = ServerEvent::ConversationUpdated {
            conversation_id: record.conversation_id,
            last_message: message.clone(),
            unread_count,
        };
        emit_to_user(&state.registry, *recipient, &updated).await;

        notify_message(state, *recipient, record).await;
    }
}

/// Produce the message-arrival notification for one recipient, honoring the
/// recipient's category toggles. A disabled category is simply not produced;
/// any failure is logged and swallowed.
async fn notify_message(state: &AppState, recipient: Uuid, record: &MessageRecord) {
    let prefs = match NotificationService::get_or_create_preferences(&state.db, recipient).await {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!(error = %e, recipient = %recipient, "failed to load preferences");
            return;
        }
    };
    if !prefs.push_enabled_for(NotificationKind::Message)
        && !prefs.email_enabled_for(NotificationKind::Message)
    {
        return;
    }

    let preview: String = record.body.chars().take(140).collect();
    let request = CreateNotificationRequest {
        recipient_id: recipient,
        title: "New message".to_string(),
        message: preview,
        kind: "message".to_string(),
        priority: "normal".to_string(),
        data: Some(serde_json::json!({
            "conversation_id": record.conversation_id,
            "message_id": record.id,
            "sender_id": record.sender_id,
        })),
        action_url: Some(format!("/conversations/{}", record.conversation_id)),
        action_text: Some("Reply".to_string()),
    };

    match NotificationService::create(&state.db, request).await {
        Ok(notification) => notification_created(state, &notification).await,
        Err(e) => {
            tracing::warn!(error = %e, recipient = %recipient,
                "failed to create message notification");
        }
    }
}

/// Deliver a persisted notification: `notification-created` to the recipient
/// when the push toggle allows, the authoritative unread counter regardless,
/// and an email dispatch when that channel is enabled.
pub async fn notification_created(state: &AppState, notification: &NotificationRecord) {
    let prefs =
        match NotificationService::get_or_create_preferences(&state.db, notification.recipient_id)
            .await
        {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!(error = %e, recipient = %notification.recipient_id,
                    "failed to load preferences, delivering with defaults");
                notification_event_and_count(
                    state,
                    notification.recipient_id,
                    ServerEvent::NotificationCreated {
                        notification: notification.clone(),
                    },
                )
                .await;
                return;
            }
        };

    if prefs.push_enabled_for(notification.kind) {
        let delivered = emit_to_user(
            &state.registry,
            notification.recipient_id,
            &ServerEvent::NotificationCreated {
                notification: notification.clone(),
            },
        )
        .await;
        if !delivered {
            tracing::debug!(recipient = %notification.recipient_id,
                "recipient not connected, notification persisted only");
        }
    }
    push_unread_count(state, notification.recipient_id).await;

    if prefs.email_enabled_for(notification.kind) && state.mailer.is_enabled() {
        state.mailer.dispatch(serde_json::json!({
            "recipient_id": notification.recipient_id,
            "kind": notification.kind.as_str(),
            "title": notification.title,
            "body": notification.body,
            "action_url": notification.action_url,
        }));
    }
}

pub async fn notification_updated(state: &AppState, notification: &NotificationRecord) {
    notification_event_and_count(
        state,
        notification.recipient_id,
        ServerEvent::NotificationUpdated {
            notification: notification.clone(),
        },
    )
    .await;
}

pub async fn notification_deleted(state: &AppState, recipient: Uuid, notification_id: Uuid) {
    notification_event_and_count(
        state,
        recipient,
        ServerEvent::NotificationDeleted {
            id: notification_id,
        },
    )
    .await;
}

async fn notification_event_and_count(state: &AppState, recipient: Uuid, event: ServerEvent) {
    emit_to_user(&state.registry, recipient, &event).await;
    push_unread_count(state, recipient).await;
}

/// Recompute and push the authoritative notification unread counter.
pub async fn push_unread_count(state: &AppState, recipient: Uuid) {
    match NotificationService::unread_count(&state.db, recipient).await {
        Ok(count) => {
            emit_to_user(
                &state.registry,
                recipient,
                &ServerEvent::NotificationUnreadCount { count },
            )
            .await;
        }
        Err(e) => {
            tracing::warn!(error = %e, recipient = %recipient,
                "failed to recompute notification unread count");
        }
    }
}

/// Announce a read-receipt pass to the conversation's other participants.
pub async fn conversation_read(
    state: &AppState,
    conversation_id: Uuid,
    reader_id: Uuid,
    message_ids: &[Uuid],
) {
    let recipients =
        match ConversationService::other_participants(&state.db, conversation_id, reader_id).await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!(error = %e, conversation_id = %conversation_id,
                    "failed to load recipients for read fan-out");
                return;
            }
        };

    let event = ServerEvent::ConversationRead {
        conversation_id,
        reader_id,
        message_ids: message_ids.to_vec(),
        marked_count: message_ids.len(),
    };
    emit_to_conversation(
        &state.rooms,
        &state.registry,
        conversation_id,
        &recipients,
        &event,
    )
    .await;
}
