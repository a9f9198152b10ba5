//! Document listing and preview URL issuance

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use shared_types::DocumentSummary;

use super::ApiState;
use crate::error::ApiError;
use crate::extractors::Principal;

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// List documents in the caller's organization, newest first.
pub async fn list_documents(
    State(state): State<ApiState>,
    principal: Principal,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let rows = state
        .store
        .list_documents(&principal.organization_id, query.folder_id.as_deref())
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|d| DocumentSummary {
                id: d.id,
                name: d.name,
                file_type: d.file_type,
                file_size: d.file_size,
                status: d.status,
                created_at: d.created_at,
            })
            .collect(),
    ))
}

/// Issue a time-bounded, read-only preview URL for one document.
///
/// The lookup is scoped to the caller's organization; a document outside
/// it is indistinguishable from a missing one.
pub async fn get_view_url(
    State(state): State<ApiState>,
    principal: Principal,
    Path(document_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let document = state
        .store
        .document_for_org(&document_id, &principal.organization_id)
        .await?;

    Ok(Json(json!({ "url": state.signer.issue(&document.blob_url) })))
}
