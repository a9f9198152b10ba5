//! Live answer relay
//!
//! Proxies the retrieval collaborator's SSE stream through the assembler:
//! the client observes only well-formed, in-order events, and when the
//! request names a chat the completed assistant message is persisted
//! server-side at `done`. An upstream end without `done` closes the
//! downstream stream without a terminal event so the client can mark the
//! answer interrupted; content already relayed is preserved client-side.

use std::convert::Infallible;

use assembler::{Applied, DecodeError, EventDecoder, MessageAssembler, Phase};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::channel::mpsc;
use futures_util::Stream;
use shared_types::{ChatStreamRequest, Message, NewCitation, Role};

use super::ApiState;
use crate::error::ApiError;
use crate::extractors::Principal;
use crate::store::ChatStore;

pub async fn chat_stream(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<ChatStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".to_string()));
    }

    // Resolve (and authorize) the persistence target before any upstream
    // work, so an unauthorized caller never opens a retrieval stream.
    let persist_to = match &request.chat_id {
        Some(chat_id) => {
            let chat = state
                .store
                .load_chat(chat_id)
                .await?
                .ok_or(ApiError::NotFound)?;
            if chat.user_id != principal.user_id {
                return Err(ApiError::NotFound);
            }
            Some(chat.id)
        }
        None => None,
    };

    let upstream = state
        .retrieval
        .stream_answer(&request)
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    let (tx, rx) = mpsc::unbounded::<Result<Event, Infallible>>();
    let store = state.store.clone();

    tokio::spawn(async move {
        let mut decoder = EventDecoder::new(upstream);
        let mut assembler = MessageAssembler::new();

        loop {
            match decoder.next_event().await {
                None => break,
                Some(Err(DecodeError::MalformedFrame(err))) => {
                    tracing::warn!(%err, "dropping malformed upstream frame");
                }
                Some(Err(DecodeError::Transport(err))) => {
                    tracing::warn!(%err, "upstream transport failed mid-answer");
                    break;
                }
                Some(Ok(event)) => {
                    if assembler.apply(event.clone()) != Applied::Accepted {
                        // Protocol violation — never reaches the client.
                        continue;
                    }
                    let frame = match Event::default().json_data(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::error!(%err, "failed to encode relay frame");
                            continue;
                        }
                    };
                    if tx.unbounded_send(Ok(frame)).is_err() {
                        // Client went away; stop reading upstream promptly.
                        assembler.abort();
                        break;
                    }
                    if assembler.phase() == Phase::Complete {
                        break;
                    }
                }
            }
        }

        if assembler.phase() == Phase::Complete {
            if let Some(chat_id) = persist_to {
                persist_assistant_message(&store, &chat_id, assembler.into_message()).await;
            }
        } else {
            assembler.abort();
            tracing::info!("answer stream ended without completion; partial content not persisted");
        }
    });

    Ok(Sse::new(rx).keep_alive(KeepAlive::default()))
}

async fn persist_assistant_message(store: &ChatStore, chat_id: &str, message: Message) {
    let citations: Vec<NewCitation> = message
        .citations
        .iter()
        .map(|c| NewCitation {
            number: c.number,
            document_id: c.document_id.clone(),
            document_name: c.document_name.clone(),
            page_number: (c.page_number > 0).then_some(c.page_number),
            chunk_text: c.chunk_text.clone(),
            relevance_score: (c.relevance_score > 0.0).then_some(c.relevance_score),
        })
        .collect();

    if let Err(err) = store
        .insert_message(
            chat_id,
            Role::Assistant,
            &message.content,
            message.thinking.as_deref(),
            &citations,
        )
        .await
    {
        tracing::error!(%err, chat_id, "failed to persist completed answer");
    }
}
