//! Letterbox Drive sync
//!
//! This module moves letters between the local store and Google Docs:
//! - Token lifecycle: supplies a usable access token, refreshing at most once
//! - Export: creates a native document from a letter
//! - Import: lists documents and flattens their bodies to plain text

pub mod export;
pub mod import;
pub mod lifecycle;

// Re-export main types
pub use export::{DocumentExporter, ExportAttempt};
pub use import::{flatten_text, DocumentImporter, ImportConfig, ImportedDocument, RemoteDocumentRef};
pub use lifecycle::TokenLifecycle;
