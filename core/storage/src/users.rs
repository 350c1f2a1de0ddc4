//! Per-user identity records and their embedded remote credential.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use letterbox_common::{CredentialState, Result, TokenPair, UserId};

use crate::db::{conversion_err, from_millis, to_millis, Database};

const USER_COLUMNS: &str = "id, provider_id, email, display_name, access_token, \
     refresh_token, token_expires_at, credential_state, created_at";

/// A provisioned user and the remote credential they granted.
#[derive(Debug, Clone, Serialize)]
pub struct UserIdentity {
    pub id: UserId,
    /// Stable subject identifier issued by the identity provider.
    pub provider_id: String,
    pub email: String,
    pub display_name: String,
    /// Owned by this identity; mutated only through [`CredentialStore`].
    #[serde(skip)]
    pub credential: TokenPair,
    pub credential_state: CredentialState,
    pub created_at: DateTime<Utc>,
}

impl UserIdentity {
    /// Build a new, not yet persisted identity.
    pub fn provision(
        provider_id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
        credential: TokenPair,
    ) -> Self {
        let credential_state = CredentialState::for_tokens(&credential);
        Self {
            id: UserId::generate(),
            provider_id: provider_id.into(),
            email: email.into(),
            display_name: display_name.into(),
            credential,
            credential_state,
            created_at: Utc::now(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let id: String = row.get(0)?;
        let state: String = row.get(7)?;
        let expires_at: Option<i64> = row.get(6)?;
        Ok(Self {
            id: UserId::new(id).map_err(|e| conversion_err(0, e))?,
            provider_id: row.get(1)?,
            email: row.get(2)?,
            display_name: row.get(3)?,
            credential: TokenPair {
                access_token: row.get(4)?,
                refresh_token: row.get(5)?,
                expires_at: expires_at.map(from_millis),
            },
            credential_state: CredentialState::parse(&state).map_err(|e| conversion_err(7, e))?,
            created_at: from_millis(row.get(8)?),
        })
    }
}

/// Credential store: the system of record for users and their token pairs.
#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look up a user by internal id.
    pub fn find_by_id(&self, id: &UserId) -> Result<Option<UserIdentity>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        self.db.with_conn(|conn| {
            conn.query_row(&sql, [id.as_str()], UserIdentity::from_row)
                .optional()
        })
    }

    /// Look up a user by the identity provider's subject id.
    pub fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<UserIdentity>> {
        let sql = format!("SELECT {} FROM users WHERE provider_id = ?1", USER_COLUMNS);
        self.db.with_conn(|conn| {
            conn.query_row(&sql, [provider_id], UserIdentity::from_row)
                .optional()
        })
    }

    /// Insert a newly provisioned user.
    ///
    /// # Errors
    /// - `TransientConflict` if another user with the same provider id won the
    ///   insert race
    pub fn insert(&self, user: &UserIdentity) -> Result<()> {
        debug!("Inserting user {} for provider id {}", user.id, user.provider_id);
        self.db.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO users
                (id, provider_id, email, display_name, access_token, refresh_token,
                 token_expires_at, credential_state, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    user.id.as_str(),
                    user.provider_id,
                    user.email,
                    user.display_name,
                    user.credential.access_token,
                    user.credential.refresh_token,
                    user.credential.expires_at.map(to_millis),
                    user.credential_state.as_str(),
                    to_millis(user.created_at),
                ],
            )
        })?;
        Ok(())
    }

    /// Overwrite descriptive fields and the token pair of an existing user,
    /// keyed by provider id. Clears any pending re-consent requirement.
    ///
    /// Returns the updated identity, or `None` if no user has this provider id.
    pub fn update_login(
        &self,
        provider_id: &str,
        email: &str,
        display_name: &str,
        tokens: &TokenPair,
    ) -> Result<Option<UserIdentity>> {
        debug!("Updating login credential for provider id {}", provider_id);
        let state = CredentialState::for_tokens(tokens);
        let sql = format!("SELECT {} FROM users WHERE provider_id = ?1", USER_COLUMNS);
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE users
                SET email = ?2, display_name = ?3, access_token = ?4, refresh_token = ?5,
                    token_expires_at = ?6, credential_state = ?7
                WHERE provider_id = ?1
                "#,
                params![
                    provider_id,
                    email,
                    display_name,
                    tokens.access_token,
                    tokens.refresh_token,
                    tokens.expires_at.map(to_millis),
                    state.as_str(),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.query_row(&sql, [provider_id], UserIdentity::from_row)
                .optional()
        })
    }

    /// Replace the token pair of a user, but only if the stored pair is still
    /// `current`.
    ///
    /// Returns `false` when another write (typically a login) changed the
    /// pair in the meantime; nothing is written in that case.
    pub fn update_tokens(&self, id: &UserId, current: &TokenPair, fresh: &TokenPair) -> Result<bool> {
        debug!("Persisting refreshed credential for user {}", id);
        let state = CredentialState::for_tokens(fresh);
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                r#"
                UPDATE users
                SET access_token = ?2, refresh_token = ?3, token_expires_at = ?4,
                    credential_state = ?5
                WHERE id = ?1 AND access_token IS ?6 AND refresh_token IS ?7
                "#,
                params![
                    id.as_str(),
                    fresh.access_token,
                    fresh.refresh_token,
                    fresh.expires_at.map(to_millis),
                    state.as_str(),
                    current.access_token,
                    current.refresh_token,
                ],
            )
        })?;
        Ok(changed > 0)
    }

    /// Record that `current` can no longer be refreshed.
    ///
    /// Tokens are kept; only a new login clears this state. Returns `false`
    /// without writing if the stored pair is no longer `current`.
    pub fn require_reauth(&self, id: &UserId, current: &TokenPair) -> Result<bool> {
        debug!("Credential for user {} requires re-consent", id);
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                r#"
                UPDATE users SET credential_state = ?2
                WHERE id = ?1 AND access_token IS ?3 AND refresh_token IS ?4
                "#,
                params![
                    id.as_str(),
                    CredentialState::ReauthRequired.as_str(),
                    current.access_token,
                    current.refresh_token,
                ],
            )
        })?;
        Ok(changed > 0)
    }

    /// List all users, oldest first.
    pub fn list(&self) -> Result<Vec<UserIdentity>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at ASC", USER_COLUMNS);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], UserIdentity::from_row)?;
            rows.collect()
        })
    }
}
