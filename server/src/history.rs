//! Cold-load conversation reconstruction
//!
//! Rebuilds a finished conversation from storage in a bounded number of
//! round-trips regardless of message or citation count: one query for
//! messages, one batched query for citations, one batched left-joined
//! query for document/folder enrichment. The resulting messages carry the
//! same [`Citation`] shape the live assembly path produces.

use std::collections::HashMap;

use shared_types::{Citation, CitationIndex, Conversation, Message};

use crate::store::{parse_role, ChatStore, CitationRow, EnrichmentRow, StoreError};

/// Load the full ordered conversation with enriched citations.
///
/// Only the owning user can reconstruct a chat; any mismatch yields
/// [`StoreError::NotFound`] rather than a partial result.
pub async fn load_conversation(
    store: &ChatStore,
    chat_id: &str,
    user_id: &str,
) -> Result<Conversation, StoreError> {
    let chat = store.load_chat(chat_id).await?.ok_or(StoreError::NotFound)?;
    if chat.user_id != user_id {
        return Err(StoreError::NotFound);
    }

    let message_rows = store.messages_for_chat(chat_id).await?;

    let assistant_ids: Vec<String> = message_rows
        .iter()
        .filter(|m| m.role == "assistant")
        .map(|m| m.id.clone())
        .collect();

    let citation_rows = store.citations_for_messages(&assistant_ids).await?;

    let mut document_ids: Vec<String> = citation_rows
        .iter()
        .filter_map(|c| c.document_id.clone())
        .collect();
    document_ids.sort();
    document_ids.dedup();

    // Enrichment is best-effort: a join failure degrades to citations
    // without document metadata rather than failing the whole load.
    let enrichment: HashMap<String, EnrichmentRow> =
        match store.enrichment_for_documents(&document_ids).await {
            Ok(rows) => rows.into_iter().map(|row| (row.id.clone(), row)).collect(),
            Err(err) => {
                tracing::warn!(
                    %err,
                    chat_id,
                    "citation enrichment failed; loading without document metadata"
                );
                HashMap::new()
            }
        };

    let mut citations_by_message: HashMap<String, CitationIndex> = HashMap::new();
    for row in citation_rows {
        let message_id = row.message_id.clone();
        let doc = row
            .document_id
            .as_deref()
            .and_then(|id| enrichment.get(id))
            .cloned();
        let citation = citation_from_row(row, doc.as_ref());
        citations_by_message
            .entry(message_id)
            .or_default()
            .insert(citation);
    }

    let messages = message_rows
        .into_iter()
        .map(|row| Message {
            role: parse_role(&row.role),
            content: row.content,
            thinking: row.thinking,
            citations: citations_by_message.remove(&row.id).unwrap_or_default(),
            is_complete: true,
        })
        .collect();

    Ok(Conversation {
        id: chat.id,
        title: chat.title,
        organization_id: chat.organization_id,
        messages,
    })
}

fn citation_from_row(row: CitationRow, enrichment: Option<&EnrichmentRow>) -> Citation {
    Citation {
        number: u32::try_from(row.number).unwrap_or(0),
        document_id: row.document_id,
        document_name: row.document_name,
        document_url: enrichment.map(|e| e.blob_url.clone()).unwrap_or_default(),
        page_number: row
            .page_number
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0),
        chunk_text: row.chunk_text,
        relevance_score: row.relevance_score.unwrap_or(0.0),
        folder_id: enrichment.and_then(|e| e.folder_id.clone()),
        folder_name: enrichment.and_then(|e| e.folder_name.clone()),
        file_type: enrichment.map(|e| e.file_type.clone()),
    }
}
