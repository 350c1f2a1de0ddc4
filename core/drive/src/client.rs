//! Google Drive v3 and Docs v1 API client.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use letterbox_common::{Error, Result};

use crate::docs::{CreatedFile, Document, FileListResponse, RemoteFile, DOCUMENT_MIME_TYPE};
use crate::provider::RemoteDocuments;

/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Docs API base URL.
const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";

/// Page size for document listings.
const LIST_PAGE_SIZE: &str = "100";

/// Characters escaped when a document id is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'?');

/// Base URLs of the Google APIs, overridable for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveEndpoints {
    pub drive_api_base: String,
    pub docs_api_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            drive_api_base: DRIVE_API_BASE.to_string(),
            docs_api_base: DOCS_API_BASE.to_string(),
        }
    }
}

/// Google error envelope: `{"error": {"code": 403, "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Drive and Docs API client.
///
/// Stateless with respect to credentials: every call takes the bearer token
/// to use, so token refresh stays with the caller.
pub struct GoogleDocsClient {
    http: Client,
    endpoints: DriveEndpoints,
}

impl GoogleDocsClient {
    /// Create a new client against the given endpoints.
    ///
    /// # Errors
    /// - An endpoint base is not an absolute URL
    /// - HTTP client construction failed
    pub fn new(endpoints: DriveEndpoints) -> Result<Self> {
        for base in [&endpoints.drive_api_base, &endpoints.docs_api_base] {
            Url::parse(base)
                .map_err(|e| Error::Configuration(format!("Invalid API base {}: {}", base, e)))?;
        }

        let http = Client::builder()
            .user_agent(concat!("Letterbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, endpoints })
    }

    fn document_url(&self, document_id: &str, suffix: &str) -> String {
        format!(
            "{}/documents/{}{}",
            self.endpoints.docs_api_base,
            utf8_percent_encode(document_id, PATH_SEGMENT),
            suffix
        )
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::remote(None, format!("Failed to parse response: {}", e)))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or(body);

        if status == StatusCode::UNAUTHORIZED {
            Error::ProviderUnauthorized(message)
        } else {
            Error::remote(Some(status.as_u16()), message)
        }
    }
}

#[async_trait]
impl RemoteDocuments for GoogleDocsClient {
    async fn create_document(&self, access_token: &str, title: &str) -> Result<String> {
        let url = format!("{}/files", self.endpoints.drive_api_base);
        let metadata = serde_json::json!({
            "name": title,
            "mimeType": DOCUMENT_MIME_TYPE,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .header(header::CONTENT_TYPE, "application/json")
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::remote(None, format!("Failed to create document: {}", e)))?;

        let created: CreatedFile = self.handle_response(response).await?;
        debug!("Created document {}", created.id);
        Ok(created.id)
    }

    async fn insert_text(
        &self,
        access_token: &str,
        document_id: &str,
        index: u32,
        text: &str,
    ) -> Result<()> {
        let url = self.document_url(document_id, ":batchUpdate");
        let body = serde_json::json!({
            "requests": [{
                "insertText": {
                    "location": { "index": index },
                    "text": text,
                }
            }]
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(None, format!("Failed to write document: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn list_documents(&self, access_token: &str) -> Result<Vec<RemoteFile>> {
        let url = format!("{}/files", self.endpoints.drive_api_base);
        let query = format!("mimeType='{}' and trashed = false", DOCUMENT_MIME_TYPE);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url).bearer_auth(access_token).query(&[
                ("q", query.as_str()),
                ("fields", "nextPageToken,files(id,name,modifiedTime)"),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", LIST_PAGE_SIZE),
            ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::remote(None, format!("Failed to list documents: {}", e)))?;

            let list_response: FileListResponse = self.handle_response(response).await?;
            all_files.extend(list_response.files);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} documents", all_files.len());
        Ok(all_files)
    }

    async fn get_document(&self, access_token: &str, document_id: &str) -> Result<Document> {
        let url = self.document_url(document_id, "");

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::remote(None, format!("Failed to fetch document: {}", e)))?;

        self.handle_response(response).await
    }
}
