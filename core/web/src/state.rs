//! Shared application state.

use std::sync::Arc;

use chrono::Duration;

use letterbox_common::Result;
use letterbox_drive::{AuthManager, RemoteDocuments};
use letterbox_identity::IdentityResolver;
use letterbox_storage::{CredentialStore, Database, LetterStore, SessionStore};
use letterbox_sync::{DocumentExporter, DocumentImporter, ImportConfig, TokenLifecycle};

use crate::config::WebConfig;
use crate::cookie::CookieSigner;

/// How long an OAuth `state` value stays redeemable.
pub const PENDING_LOGIN_MAX_AGE_MINUTES: i64 = 10;

/// Everything a handler needs, built once at startup.
pub struct AppState {
    pub config: WebConfig,
    pub identity: IdentityResolver,
    pub letters: LetterStore,
    pub auth: Arc<AuthManager>,
    pub lifecycle: TokenLifecycle,
    pub exporter: DocumentExporter,
    pub importer: DocumentImporter,
    pub cookies: CookieSigner,
}

impl AppState {
    /// Wire the stores, the OAuth client and the document client together.
    pub fn new(
        db: Database,
        auth: AuthManager,
        remote: Arc<dyn RemoteDocuments>,
        config: WebConfig,
        import: ImportConfig,
    ) -> Self {
        let credentials = CredentialStore::new(db.clone());
        let identity = IdentityResolver::new(credentials.clone(), SessionStore::new(db.clone()));
        let auth = Arc::new(auth);

        Self {
            identity,
            letters: LetterStore::new(db),
            lifecycle: TokenLifecycle::new(credentials, auth.clone()),
            exporter: DocumentExporter::new(remote.clone()),
            importer: DocumentImporter::new(remote, import),
            cookies: CookieSigner::new(&config.session_secret),
            auth,
            config,
        }
    }

    pub fn pending_login_max_age(&self) -> Duration {
        Duration::minutes(PENDING_LOGIN_MAX_AGE_MINUTES)
    }

    /// Drop expired sessions and abandoned logins.
    pub fn purge_expired(&self) -> Result<usize> {
        self.identity
            .sessions()
            .purge_expired(self.pending_login_max_age())
    }
}
