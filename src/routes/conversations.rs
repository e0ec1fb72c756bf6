use crate::middleware::guards::{Participant, User};
use crate::models::{ConversationDetail, ConversationSummary, MessageDto};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::push;
use crate::services::read_receipts::ReadReceiptService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub other_user_id: Uuid,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct StartConversationResponse {
    pub id: Uuid,
    pub created: bool,
    pub first_message: Option<MessageDto>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub conversation_id: Uuid,
    pub marked_count: usize,
    pub message_ids: Vec<Uuid>,
}

/// POST /conversations
/// Idempotent: the same two-party pair yields the same conversation id.
pub async fn start_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<StartConversationRequest>,
) -> Result<(StatusCode, Json<StartConversationResponse>), crate::error::AppError> {
    let first_message = match body.message.as_deref() {
        Some(text) => Some(MessageService::validate_body(text)?.to_string()),
        None => None,
    };

    let started = ConversationService::start_conversation(
        &state.db,
        user.id,
        body.other_user_id,
        first_message.as_deref(),
    )
    .await?;

    // Fan-out happens after the commit; failures there never undo the write
    let first_message = match started.first_message {
        Some(record) => {
            push::message_created(&state, &record).await;
            Some(record.into_dto(user.id))
        }
        None => None,
    };

    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(StartConversationResponse {
            id: started.conversation_id,
            created: started.created,
            first_message,
        }),
    ))
}

/// GET /conversations?search=
pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ConversationSummary>>, crate::error::AppError> {
    let summaries =
        ConversationService::list_summaries(&state.db, user.id, query.search.as_deref()).await?;
    Ok(Json(summaries))
}

/// GET /conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDetail>, crate::error::AppError> {
    let detail = ConversationService::get_detail(&state.db, id, user.id).await?;
    Ok(Json(detail))
}

/// GET /conversations/{id}/messages?limit=&offset=
pub async fn get_messages(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<MessageDto>>, crate::error::AppError> {
    let messages =
        MessageService::get_messages(&state.db, id, user.id, page.limit, page.offset).await?;
    Ok(Json(messages))
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), crate::error::AppError> {
    let record = MessageService::send_message(&state.db, id, user.id, &body.body).await?;

    // Persisted; everything past this point is best-effort live delivery
    push::message_created(&state, &record).await;

    Ok((StatusCode::CREATED, Json(record.into_dto(user.id))))
}

/// POST /conversations/{id}/read
/// Idempotent: a repeat call reports zero newly marked messages.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, crate::error::AppError> {
    let participant = Participant::verify(&state.db, user.id, id).await?;

    let message_ids =
        ReadReceiptService::mark_conversation_read(&state.db, user.id, participant.conversation_id)
            .await?;

    if !message_ids.is_empty() {
        push::conversation_read(&state, id, user.id, &message_ids).await;
    }

    Ok(Json(MarkReadResponse {
        conversation_id: id,
        marked_count: message_ids.len(),
        message_ids,
    }))
}
