//! Persistence layer for Letterbox.
//!
//! All state that outlives a request lives in one SQLite database:
//! - `users`: identities and their embedded remote credential (the credential store)
//! - `letters`: the local letter store, read by the exporter
//! - `sessions` and `pending_logins`: server-side session binding and OAuth state
//!
//! Every mutation of a credential is a single statement. A login writes
//! unconditionally by provider id; a refresh writes by user id only while the
//! stored pair is still the one it started from. A login and a token refresh
//! racing on the same user therefore cannot lose each other's write.

pub mod db;
pub mod letters;
pub mod sessions;
pub mod users;

pub use db::Database;
pub use letters::{Letter, LetterStore};
pub use sessions::{Session, SessionStore};
pub use users::{CredentialStore, UserIdentity};
