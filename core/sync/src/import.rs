//! Google Docs → letter-shaped import for display.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use letterbox_common::Result;
use letterbox_drive::{Document, RemoteDocuments, RemoteFile};

/// Configuration for document import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Maximum number of document bodies fetched at once.
    pub max_concurrent_fetches: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
        }
    }
}

/// A remote document projected into the local letter shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDocumentRef {
    pub remote_id: String,
    pub title: String,
    pub content: String,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl RemoteDocumentRef {
    /// Total projection: every missing part of the listing or body maps to a
    /// default.
    pub fn project(file: &RemoteFile, document: &Document) -> Self {
        let title = if file.name.is_empty() {
            document.title.clone()
        } else {
            file.name.clone()
        };

        Self {
            remote_id: file.id.clone(),
            title,
            content: flatten_text(document),
            last_modified_at: file.modified_time,
        }
    }
}

/// Outcome of importing one listed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportedDocument {
    Imported(RemoteDocumentRef),
    Failed {
        remote_id: String,
        title: String,
        last_modified_at: Option<DateTime<Utc>>,
        message: String,
    },
}

impl ImportedDocument {
    pub fn remote_id(&self) -> &str {
        match self {
            Self::Imported(doc) => &doc.remote_id,
            Self::Failed { remote_id, .. } => remote_id,
        }
    }

    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Imported(doc) => doc.last_modified_at,
            Self::Failed {
                last_modified_at, ..
            } => *last_modified_at,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Concatenate the text of every text run of every paragraph, in document
/// order. Elements without a text run contribute nothing.
pub fn flatten_text(document: &Document) -> String {
    let Some(body) = &document.body else {
        return String::new();
    };

    body.content
        .iter()
        .filter_map(|element| element.paragraph.as_ref())
        .flat_map(|paragraph| paragraph.elements.iter())
        .map(|element| {
            element
                .text_run
                .as_ref()
                .and_then(|run| run.content.as_deref())
                .unwrap_or("")
        })
        .collect()
}

/// Lists remote documents and materializes their text.
#[derive(Clone)]
pub struct DocumentImporter {
    remote: Arc<dyn RemoteDocuments>,
    config: ImportConfig,
}

impl DocumentImporter {
    pub fn new(remote: Arc<dyn RemoteDocuments>, config: ImportConfig) -> Self {
        Self { remote, config }
    }

    /// List every document, most recently modified first.
    ///
    /// A body that fails to load becomes a `Failed` entry; the rest are still
    /// returned. A rejected access token fails the whole call so the caller
    /// can refresh and retry.
    pub async fn list_documents(&self, access_token: &str) -> Result<Vec<ImportedDocument>> {
        let files = self.remote.list_documents(access_token).await?;
        debug!("Fetching {} document bodies", files.len());

        let results: Vec<Result<ImportedDocument>> = stream::iter(files)
            .map(|file| self.fetch(access_token, file))
            .buffered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;

        let mut documents = results.into_iter().collect::<Result<Vec<_>>>()?;
        documents.sort_by(|a, b| b.last_modified_at().cmp(&a.last_modified_at()));
        Ok(documents)
    }

    async fn fetch(&self, access_token: &str, file: RemoteFile) -> Result<ImportedDocument> {
        match self.remote.get_document(access_token, &file.id).await {
            Ok(document) => Ok(ImportedDocument::Imported(RemoteDocumentRef::project(
                &file, &document,
            ))),
            Err(e) if e.is_provider_unauthorized() => Err(e),
            Err(e) => {
                warn!("Failed to load document {}: {}", file.id, e);
                Ok(ImportedDocument::Failed {
                    remote_id: file.id,
                    title: file.name,
                    last_modified_at: file.modified_time,
                    message: e.to_string(),
                })
            }
        }
    }
}
