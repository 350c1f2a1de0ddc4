//! Common utilities and types shared across Letterbox modules.
//!
//! This module provides the error taxonomy, identifiers and the credential
//! types that every other crate in the workspace speaks.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{CredentialState, LetterId, TokenPair, UserId};
