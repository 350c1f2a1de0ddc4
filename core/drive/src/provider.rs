//! Provider traits consumed by the sync layer.

use async_trait::async_trait;

use letterbox_common::{Result, TokenPair};

use crate::docs::{Document, RemoteFile};

/// Remote document store operations, authorized by a bearer access token.
///
/// Implementations report a rejected access token as
/// `Error::ProviderUnauthorized` and every other rejection as
/// `Error::RemoteProvider`.
#[async_trait]
pub trait RemoteDocuments: Send + Sync {
    /// Create an empty native document named `title`. Returns its id.
    async fn create_document(&self, access_token: &str, title: &str) -> Result<String>;

    /// Insert `text` into the body of `document_id` at character `index`.
    async fn insert_text(
        &self,
        access_token: &str,
        document_id: &str,
        index: u32,
        text: &str,
    ) -> Result<()>;

    /// List every native document visible to the token, most recently
    /// modified first.
    async fn list_documents(&self, access_token: &str) -> Result<Vec<RemoteFile>>;

    /// Fetch the structured body of a document.
    async fn get_document(&self, access_token: &str, document_id: &str) -> Result<Document>;
}

/// Mints a new access token from a refresh token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// # Errors
    /// - Invalid or revoked refresh token
    /// - Network errors
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}
