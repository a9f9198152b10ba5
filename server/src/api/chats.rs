//! Chat listing, creation, and the persisted message read/write paths

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{Message, NewCitation, Role};

use super::ApiState;
use crate::error::ApiError;
use crate::extractors::Principal;
use crate::history;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ChatSummaryResponse {
    pub id: String,
    pub title: Option<String>,
}

/// List the caller's chats, newest-updated first.
pub async fn list_chats(
    State(state): State<ApiState>,
    principal: Principal,
) -> Result<Json<Vec<ChatSummaryResponse>>, ApiError> {
    let chats = state
        .store
        .list_chats(&principal.organization_id, &principal.user_id)
        .await?;

    Ok(Json(
        chats
            .into_iter()
            .map(|c| ChatSummaryResponse {
                id: c.id,
                title: c.title,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

pub async fn create_chat(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<CreateChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.id.trim().is_empty() {
        return Err(ApiError::BadRequest("chat id cannot be empty".to_string()));
    }

    state
        .store
        .create_chat(
            &request.id,
            &principal.organization_id,
            &principal.user_id,
            request.title.as_deref(),
        )
        .await?;

    Ok(Json(json!({ "id": request.id })))
}

/// Response of the cold-load read path.
///
/// An empty `organizationId` signals "not found or not authorized";
/// callers must treat it as not-found and render nothing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub title: Option<String>,
    pub messages: Vec<Message>,
    pub organization_id: String,
}

/// Reconstruct a conversation from storage with enriched citations.
pub async fn get_messages(
    State(state): State<ApiState>,
    principal: Principal,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    match history::load_conversation(&state.store, &chat_id, &principal.user_id).await {
        Ok(conversation) => Ok(Json(ChatHistoryResponse {
            title: conversation.title,
            messages: conversation.messages,
            organization_id: conversation.organization_id,
        })),
        Err(StoreError::NotFound) => Ok(Json(ChatHistoryResponse {
            title: None,
            messages: Vec::new(),
            organization_id: String::new(),
        })),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessageRequest {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub citations: Vec<NewCitation>,
}

/// Persist one message (and its citations) to a chat the caller owns.
pub async fn add_message(
    State(state): State<ApiState>,
    principal: Principal,
    Path(chat_id): Path<String>,
    Json(request): Json<AddMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let chat = state
        .store
        .load_chat(&chat_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if chat.user_id != principal.user_id {
        return Err(ApiError::NotFound);
    }

    let message_id = state
        .store
        .insert_message(
            &chat_id,
            request.role,
            &request.content,
            request.thinking.as_deref(),
            &request.citations,
        )
        .await?;

    Ok(Json(json!({ "id": message_id })))
}
