//! Google identity, Drive and Docs integration for Letterbox.
//!
//! This module provides:
//! - OAuth2 consent URL generation, code exchange and token refresh
//! - The userinfo lookup that identifies who just logged in
//! - A Drive v3 / Docs v1 client for creating, listing and reading documents
//!
//! The [`RemoteDocuments`] and [`TokenRefresher`] traits are the seams the sync
//! layer depends on; [`GoogleDocsClient`] and [`AuthManager`] are the
//! production implementations.

pub mod auth;
pub mod client;
pub mod docs;
pub mod provider;

pub use auth::{AuthConfig, AuthManager, ProviderProfile};
pub use client::{DriveEndpoints, GoogleDocsClient};
pub use docs::{Document, RemoteFile};
pub use provider::{RemoteDocuments, TokenRefresher};
