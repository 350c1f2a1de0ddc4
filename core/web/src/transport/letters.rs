//! Drive export and import endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use letterbox_common::{Error, LetterId};
use letterbox_sync::{ExportAttempt, ImportedDocument};

use crate::error::ApiError;
use crate::state::AppState;
use crate::transport::session::CurrentUser;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub message: &'static str,
    pub doc_id: String,
}

/// A Drive document shown alongside local letters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveLetter {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_drive_letter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ImportedDocument> for DriveLetter {
    fn from(doc: ImportedDocument) -> Self {
        match doc {
            ImportedDocument::Imported(doc) => Self {
                id: doc.remote_id,
                title: doc.title,
                content: Some(doc.content),
                last_modified: doc.last_modified_at,
                is_drive_letter: true,
                error: None,
            },
            ImportedDocument::Failed {
                remote_id,
                title,
                last_modified_at,
                message,
            } => Self {
                id: remote_id,
                title,
                content: None,
                last_modified: last_modified_at,
                is_drive_letter: true,
                error: Some(message),
            },
        }
    }
}

// -- Handlers -----------------------------------------------------------------

fn letter_not_found() -> Error {
    Error::NotFound("Letter not found".to_string())
}

/// `POST /letters/{id}/save-to-drive`
///
/// A retry after a token refresh writes into the document the first try
/// created. Failing to record the document id on the letter does not fail
/// the request, since the document already exists.
pub async fn save_to_drive(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SaveResponse>, ApiError> {
    let letter_id = LetterId::new(id).map_err(|_| letter_not_found())?;
    let letter = s
        .letters
        .find_for_author(&letter_id, &user.id)?
        .ok_or_else(letter_not_found)?;

    let exporter = &s.exporter;
    let letter_ref = &letter;
    let attempt = &ExportAttempt::new();
    let doc_id = s
        .lifecycle
        .with_credential(&user.id, |token| async move {
            exporter.resume_export(letter_ref, &token, attempt).await
        })
        .await
        .map_err(|e| ApiError::from(e).with_message("Error saving to Google Drive"))?;

    if let Err(e) = s.letters.record_export(&letter.id, &doc_id) {
        warn!(
            "Exported letter {} to {} but could not record it: {}",
            letter.id, doc_id, e
        );
    }

    Ok(Json(SaveResponse {
        message: "Letter saved to Google Drive successfully",
        doc_id,
    }))
}

/// `GET /letters/drive/letters`
pub async fn drive_letters(
    State(s): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<DriveLetter>>, ApiError> {
    let importer = &s.importer;
    let documents = s
        .lifecycle
        .with_credential(&user.id, |token| async move {
            importer.list_documents(&token).await
        })
        .await
        .map_err(|e| ApiError::from(e).with_message("Error fetching Drive letters"))?;

    Ok(Json(documents.into_iter().map(DriveLetter::from).collect()))
}
