//! Shared types between the assembly engine and the API server
//!
//! These types are used by both:
//! - The live path (stream decoding + message assembly)
//! - The cold-load path (history reconstruction from storage)
//!
//! Both paths converge on the same [`Message`] / [`Citation`] shapes so the
//! rendering layer never knows which one produced them. Serializable with
//! serde for JSON over SSE/HTTP; exported to TypeScript with ts-rs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Core Types
// ============================================================================

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub enum Role {
    User,
    Assistant,
}

/// Generate an opaque row identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Stream Event Contract
// ============================================================================

/// Raw source payload carried by a `citation` stream event.
///
/// Field names follow the retrieval collaborator's wire format exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct CitationSource {
    /// Empty when the source lives outside the document store.
    #[serde(default)]
    pub document_id: String,
    pub document_name: String,
    #[serde(default)]
    pub document_url: String,
    /// `0` means "not applicable", not "page zero".
    #[serde(default)]
    pub page_number: u32,
    pub chunk_text: String,
    /// In `[0, 1]`; `0` means unknown.
    #[serde(default)]
    pub relevance_score: f64,
}

/// One event on the answer stream, delivered in strict arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub enum StreamEvent {
    /// Append to the answer content.
    Chunk { content: String },

    /// One citation payload. May arrive before, between, or after the
    /// chunks that reference it.
    Citation { number: u32, source: CitationSource },

    /// Append to the reasoning buffer.
    Thinking { content: String },

    /// End of the reasoning phase.
    ThinkingDone,

    /// Terminal: no further events will arrive for this answer.
    Done,
}

// ============================================================================
// Citations
// ============================================================================

/// Source-type classification, used for icon and preview selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub enum SourceKind {
    Pdf,
    Word,
    Generic,
}

/// One grounding reference attached to an answer.
///
/// `folder_id` / `folder_name` / `file_type` are enrichment fields populated
/// only by the document/folder join on the cold-load path; the live stream
/// never carries them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct Citation {
    /// Assigned upstream; unique within one message. Opaque — the assembler
    /// never renumbers.
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub document_name: String,
    #[serde(default)]
    pub document_url: String,
    #[serde(default)]
    pub page_number: u32,
    pub chunk_text: String,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl Citation {
    /// Build the display shape from a raw `citation` event payload.
    pub fn from_source(number: u32, source: CitationSource) -> Self {
        Self {
            number,
            document_id: (!source.document_id.is_empty()).then_some(source.document_id),
            document_name: source.document_name,
            document_url: source.document_url,
            page_number: source.page_number,
            chunk_text: source.chunk_text,
            relevance_score: source.relevance_score,
            folder_id: None,
            folder_name: None,
            file_type: None,
        }
    }

    /// Final path segment of `document_name`, for display.
    pub fn display_name(&self) -> &str {
        self.document_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.document_name.as_str())
    }

    /// PDF > Word/DOCX > generic. Case-insensitive substring match on the
    /// MIME/type string first, filename extension second.
    pub fn source_kind(&self) -> SourceKind {
        if let Some(file_type) = &self.file_type {
            let ft = file_type.to_ascii_lowercase();
            if ft.contains("pdf") {
                return SourceKind::Pdf;
            }
            if ft.contains("word") || ft.contains("docx") {
                return SourceKind::Word;
            }
        }
        let name = self.display_name().to_ascii_lowercase();
        if name.ends_with(".pdf") {
            SourceKind::Pdf
        } else if name.ends_with(".docx") || name.ends_with(".doc") {
            SourceKind::Word
        } else {
            SourceKind::Generic
        }
    }

    /// Only PDFs are eligible for inline preview; everything else routes to
    /// the "unable to preview" fallback.
    pub fn previewable(&self) -> bool {
        self.source_kind() == SourceKind::Pdf
    }
}

/// Insertion-ordered mapping from citation number to citation metadata.
///
/// Shared by the live assembler and the cold-load reconstructor. Upserts are
/// keyed by `number` with last-write-wins semantics: the same number may
/// legitimately re-arrive with refined metadata, and the slot keeps its
/// original arrival position so marker numbering stays stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationIndex {
    order: Vec<u32>,
    by_number: HashMap<u32, Citation>,
}

impl CitationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert. Returns the replaced citation, if any.
    pub fn insert(&mut self, citation: Citation) -> Option<Citation> {
        let number = citation.number;
        let previous = self.by_number.insert(number, citation);
        if previous.is_none() {
            self.order.push(number);
        }
        previous
    }

    pub fn resolve(&self, number: u32) -> Option<&Citation> {
        self.by_number.get(&number)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Citations in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.order
            .iter()
            .filter_map(move |number| self.by_number.get(number))
    }
}

impl FromIterator<Citation> for CitationIndex {
    fn from_iter<T: IntoIterator<Item = Citation>>(iter: T) -> Self {
        let mut index = Self::new();
        for citation in iter {
            index.insert(citation);
        }
        index
    }
}

impl Serialize for CitationIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CitationIndex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let citations = Vec::<Citation>::deserialize(deserializer)?;
        Ok(citations.into_iter().collect())
    }
}

// ============================================================================
// Messages & Conversations
// ============================================================================

/// One turn in a conversation.
///
/// Created empty when a query is submitted, mutated incrementally by the
/// assembler while streaming, frozen once `is_complete` is set or the
/// message is loaded from history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct Message {
    pub role: Role,
    /// User-visible text; may contain inline `[N]` markers. Never mutated
    /// at render time — marker resolution is a presentation-layer mapping.
    pub content: String,
    /// Reasoning text, displayed only in a secondary collapsible view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "CitationIndex::is_empty")]
    #[ts(type = "Array<Citation>")]
    pub citations: CitationIndex,
    /// `false` while streaming or after an interrupted stream.
    #[serde(default)]
    pub is_complete: bool,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content: String::new(),
            thinking: None,
            citations: CitationIndex::new(),
            is_complete: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thinking: None,
            citations: CitationIndex::new(),
            is_complete: true,
        }
    }
}

/// Ordered sequence of messages, append-only during a live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub organization_id: String,
    pub messages: Vec<Message>,
}

// ============================================================================
// API Request Shapes
// ============================================================================

/// One prior turn, as sent to the retrieval collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct RetrievalFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_names: Option<Vec<String>>,
}

/// Body of `POST /chat/stream`. Field names follow the retrieval
/// collaborator's wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct ChatStreamRequest {
    pub organization_id: String,
    pub query: String,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RetrievalFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// When present, the completed assistant message is persisted to this
    /// chat at `done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Citation shape accepted by the persisted write path. Optional fields
/// default to absent/zero when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct NewCitation {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub document_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub chunk_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// Row shape of the documents listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../web/src/types/generated.ts")]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
