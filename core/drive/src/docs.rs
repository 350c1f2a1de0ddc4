//! Wire types for the Drive file listing and the Docs document body.
//!
//! Every field is optional or defaulted: the Docs API omits empty parts of a
//! document, and a missing field must never fail deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME type of native Google Docs documents.
pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

/// Drive file metadata, as requested with `fields=files(id,name,modifiedTime)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

/// Response from listing files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileListResponse {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Response from `files.create`.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedFile {
    pub id: String,
}

/// A Docs document as returned by `documents.get`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Body {
    pub content: Vec<StructuralElement>,
}

/// One block of the body. Only paragraphs carry text we keep; tables,
/// section breaks and the like deserialize with `paragraph: None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StructuralElement {
    pub paragraph: Option<Paragraph>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Paragraph {
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParagraphElement {
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextRun {
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_with_missing_parts_deserializes() {
        let json = r#"{
            "documentId": "doc-1",
            "body": {
                "content": [
                    { "sectionBreak": {} },
                    { "paragraph": { "elements": [ { "textRun": { "content": "Hi\n" } } ] } },
                    { "paragraph": { "elements": [ { "inlineObjectElement": {} } ] } },
                    { "paragraph": {} },
                    { "table": {} }
                ]
            }
        }"#;

        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.document_id, "doc-1");
        assert!(doc.title.is_empty());

        let content = doc.body.unwrap().content;
        assert_eq!(content.len(), 5);
        assert!(content[0].paragraph.is_none());
        assert!(content[2].paragraph.as_ref().unwrap().elements[0].text_run.is_none());
        assert!(content[3].paragraph.as_ref().unwrap().elements.is_empty());
    }

    #[test]
    fn test_file_list_without_next_page() {
        let json = r#"{ "files": [ { "id": "a", "name": "A", "modifiedTime": "2024-05-01T10:00:00.000Z" } ] }"#;
        let list: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.files.len(), 1);
        assert!(list.files[0].modified_time.is_some());
        assert!(list.next_page_token.is_none());
    }
}
