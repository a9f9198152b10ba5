//! SQLite-backed chat store
//!
//! Schema (created on [`ChatStore::migrate`]): chats, messages, citations,
//! plus the documents/folders tables the citation enrichment joins against.
//! Citation rows keep their insertion order (rowid) so the cold-load path
//! reproduces the live path's arrival order exactly.

use chrono::{DateTime, Utc};
use shared_types::{generate_id, NewCitation, Role};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Missing, or not owned by the caller — indistinguishable on purpose.
    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRecord {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSummary {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub role: String,
    pub content: String,
    pub thinking: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CitationRow {
    pub message_id: String,
    pub number: i64,
    pub document_id: Option<String>,
    pub document_name: String,
    pub page_number: Option<i64>,
    pub chunk_text: String,
    pub relevance_score: Option<f64>,
}

/// One document joined with its folder, keyed by document id.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnrichmentRow {
    pub id: String,
    pub blob_url: String,
    pub file_type: String,
    pub folder_id: Option<String>,
    pub folder_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub organization_id: String,
    pub folder_id: Option<String>,
    pub name: String,
    pub blob_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id              TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                title           TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                chat_id    TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                thinking   TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS citations (
                id              TEXT PRIMARY KEY,
                message_id      TEXT NOT NULL,
                number          INTEGER NOT NULL,
                document_id     TEXT,
                document_name   TEXT NOT NULL,
                page_number     INTEGER,
                chunk_text      TEXT NOT NULL,
                relevance_score REAL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id              TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                folder_id       TEXT,
                name            TEXT NOT NULL,
                blob_url        TEXT NOT NULL,
                file_type       TEXT NOT NULL,
                file_size       INTEGER NOT NULL DEFAULT 0,
                status          TEXT NOT NULL DEFAULT 'uploaded',
                created_at      TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS folders (
                id              TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                name            TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_owner ON chats(organization_id, user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_citations_message ON citations(message_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_org ON documents(organization_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    pub async fn create_chat(
        &self,
        id: &str,
        organization_id: &str,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO chats (id, organization_id, user_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(organization_id)
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The caller's chats, newest-updated first.
    pub async fn list_chats(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<ChatSummary>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT id, title FROM chats
             WHERE organization_id = ? AND user_id = ?
             ORDER BY updated_at DESC
             LIMIT 50",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn load_chat(&self, chat_id: &str) -> Result<Option<ChatRecord>, StoreError> {
        let row = sqlx::query_as(
            "SELECT id, organization_id, user_id, title FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Messages & citations
    // ------------------------------------------------------------------

    /// All messages of one chat, ordered by creation time ascending.
    pub async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT id, role, content, thinking, created_at FROM messages
             WHERE chat_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Citations for a whole set of messages in one batched query.
    pub async fn citations_for_messages(
        &self,
        message_ids: &[String],
    ) -> Result<Vec<CitationRow>, StoreError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT message_id, number, document_id, document_name, page_number, chunk_text, relevance_score
             FROM citations WHERE message_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in message_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        builder.push(" ORDER BY rowid ASC");

        let rows = builder
            .build_query_as::<CitationRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Document + folder enrichment for a set of document ids, in one
    /// batched, left-joined query. Unknown ids simply produce no row.
    pub async fn enrichment_for_documents(
        &self,
        document_ids: &[String],
    ) -> Result<Vec<EnrichmentRow>, StoreError> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.id, d.blob_url, d.file_type, d.folder_id, f.name AS folder_name
             FROM documents d
             LEFT JOIN folders f ON d.folder_id = f.id
             WHERE d.id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in document_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<EnrichmentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Persist one message with its citations. Optional citation fields
    /// default to absent/zero. Returns the new message id.
    pub async fn insert_message(
        &self,
        chat_id: &str,
        role: Role,
        content: &str,
        thinking: Option<&str>,
        citations: &[NewCitation],
    ) -> Result<String, StoreError> {
        let message_id = generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, chat_id, role, content, thinking, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message_id)
        .bind(chat_id)
        .bind(role_str(role))
        .bind(content)
        .bind(thinking)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for citation in citations {
            sqlx::query(
                "INSERT INTO citations
                 (id, message_id, number, document_id, document_name, page_number, chunk_text, relevance_score)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(generate_id())
            .bind(&message_id)
            .bind(citation.number as i64)
            .bind(citation.document_id.as_deref())
            .bind(&citation.document_name)
            .bind(citation.page_number.map(|p| p as i64))
            .bind(&citation.chunk_text)
            .bind(citation.relevance_score)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE chats SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message_id)
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// One document, scoped to the caller's organization.
    pub async fn document_for_org(
        &self,
        document_id: &str,
        organization_id: &str,
    ) -> Result<DocumentRow, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, organization_id, folder_id, name, blob_url, file_type, file_size, status, created_at
             FROM documents WHERE id = ? AND organization_id = ?",
        )
        .bind(document_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(StoreError::NotFound)
    }

    pub async fn list_documents(
        &self,
        organization_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DocumentRow>, StoreError> {
        let rows = match folder_id {
            Some(folder_id) => {
                sqlx::query_as(
                    "SELECT id, organization_id, folder_id, name, blob_url, file_type, file_size, status, created_at
                     FROM documents WHERE organization_id = ? AND folder_id = ?
                     ORDER BY created_at DESC",
                )
                .bind(organization_id)
                .bind(folder_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, organization_id, folder_id, name, blob_url, file_type, file_size, status, created_at
                     FROM documents WHERE organization_id = ?
                     ORDER BY created_at DESC",
                )
                .bind(organization_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}

pub fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub fn parse_role(raw: &str) -> Role {
    if raw == "assistant" {
        Role::Assistant
    } else {
        Role::User
    }
}
