//! Letter → Google Doc export.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use letterbox_common::Result;
use letterbox_drive::RemoteDocuments;
use letterbox_storage::Letter;

/// Index of the first character of a new document's body.
const BODY_START_INDEX: u32 = 1;

/// Progress of one export that may be attempted more than once.
///
/// Remembers the created document so a retried attempt (for instance after a
/// token refresh) writes into it instead of creating another one.
#[derive(Debug, Default)]
pub struct ExportAttempt {
    document_id: OnceLock<String>,
}

impl ExportAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The document created by an earlier attempt, if any.
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.get().map(String::as_str)
    }
}

/// Creates remote documents from local letters.
#[derive(Clone)]
pub struct DocumentExporter {
    remote: Arc<dyn RemoteDocuments>,
}

impl DocumentExporter {
    pub fn new(remote: Arc<dyn RemoteDocuments>) -> Self {
        Self { remote }
    }

    /// Create a document named after the letter and write its content.
    ///
    /// The document is created first and only then written. A failed write
    /// leaves the empty document in place.
    pub async fn export_letter(&self, letter: &Letter, access_token: &str) -> Result<String> {
        self.resume_export(letter, access_token, &ExportAttempt::new())
            .await
    }

    /// Like [`export_letter`](Self::export_letter), but a document already
    /// recorded in `attempt` is reused and only the write is repeated.
    pub async fn resume_export(
        &self,
        letter: &Letter,
        access_token: &str,
        attempt: &ExportAttempt,
    ) -> Result<String> {
        let document_id = match attempt.document_id() {
            Some(id) => {
                debug!("Resuming export of letter {} into document {}", letter.id, id);
                id.to_string()
            }
            None => {
                let id = self
                    .remote
                    .create_document(access_token, &letter.title)
                    .await?;
                attempt.document_id.get_or_init(|| id).clone()
            }
        };

        if !letter.content.is_empty() {
            if let Err(e) = self
                .remote
                .insert_text(access_token, &document_id, BODY_START_INDEX, &letter.content)
                .await
            {
                warn!(
                    "Writing letter {} to document {} failed: {}",
                    letter.id, document_id, e
                );
                return Err(e);
            }
        }

        info!("Exported letter {} to document {}", letter.id, document_id);
        Ok(document_id)
    }
}
