//! HTTP API routes for the Docent server

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

pub mod chats;
pub mod documents;
pub mod stream;

use crate::retrieval::RetrievalClient;
use crate::signed_url::UrlSigner;
use crate::store::ChatStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: ChatStore,
    pub retrieval: RetrievalClient,
    pub signer: UrlSigner,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        // Chat routes
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(chats::get_messages).post(chats::add_message),
        )
        // Live answer relay
        .route("/chat/stream", post(stream::chat_stream))
        // Document routes
        .route("/documents", get(documents::list_documents))
        .route(
            "/documents/{document_id}/view-url",
            get(documents::get_view_url),
        )
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "docent-server",
            "version": "0.1.0"
        })),
    )
}
