//! Find-or-provision of users keyed by provider id, plus session binding.

use chrono::Duration;
use tracing::{debug, info, warn};

use letterbox_common::{Error, Result, TokenPair, UserId};
use letterbox_drive::ProviderProfile;
use letterbox_storage::{CredentialStore, Session, SessionStore, UserIdentity};

/// Lifetime of a browser session.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Resolves provider identities to local users.
#[derive(Clone)]
pub struct IdentityResolver {
    credentials: CredentialStore,
    sessions: SessionStore,
    session_ttl: Duration,
}

impl IdentityResolver {
    pub fn new(credentials: CredentialStore, sessions: SessionStore) -> Self {
        Self {
            credentials,
            sessions,
            session_ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Override the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Find the user for `provider_id` and overwrite their credential, or
    /// provision a new user if none exists.
    ///
    /// A concurrent first login for the same provider id loses the insert race
    /// with `TransientConflict`; that is absorbed here by retrying once as an
    /// update, so callers never see it.
    pub fn resolve(
        &self,
        provider_id: &str,
        email: &str,
        display_name: &str,
        tokens: TokenPair,
    ) -> Result<UserIdentity> {
        if let Some(user) = self
            .credentials
            .update_login(provider_id, email, display_name, &tokens)?
        {
            debug!("Resolved existing user {}", user.id);
            return Ok(user);
        }

        let user = UserIdentity::provision(provider_id, email, display_name, tokens);
        match self.credentials.insert(&user) {
            Ok(()) => {
                info!("Provisioned user {} for {}", user.id, email);
                Ok(user)
            }
            Err(Error::TransientConflict(reason)) => {
                warn!("Concurrent provisioning for {}: {}", provider_id, reason);
                self.credentials
                    .update_login(provider_id, email, display_name, &user.credential)?
                    .ok_or_else(|| {
                        Error::Storage(format!(
                            "user for provider id {} vanished after conflict",
                            provider_id
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the user behind a session id. Never provisions.
    pub fn current_user(&self, session_id: &str) -> Result<Option<UserIdentity>> {
        match self.sessions.find_active(session_id)? {
            Some(session) => self.credentials.find_by_id(&session.user_id),
            None => Ok(None),
        }
    }

    /// Resolve the user for a completed consent and open a session for them.
    pub fn login(
        &self,
        profile: &ProviderProfile,
        tokens: TokenPair,
    ) -> Result<(UserIdentity, Session)> {
        let user = self.resolve(&profile.sub, &profile.email, profile.display_name(), tokens)?;
        let session = self.sessions.create(&user.id, self.session_ttl)?;
        info!("User {} logged in", user.id);
        Ok((user, session))
    }

    /// End a session. Unknown ids are ignored.
    pub fn logout(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id)
    }

    /// Look up a user by internal id.
    pub fn find_user(&self, id: &UserId) -> Result<Option<UserIdentity>> {
        self.credentials.find_by_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use letterbox_common::CredentialState;
    use letterbox_storage::Database;
    use proptest::prelude::*;

    fn resolver() -> IdentityResolver {
        let db = Database::in_memory().unwrap();
        IdentityResolver::new(CredentialStore::new(db.clone()), SessionStore::new(db))
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair::new(access, Some(refresh.to_string()), None)
    }

    #[test]
    fn test_first_login_provisions() {
        let resolver = resolver();
        let user = resolver
            .resolve("sub-1", "ada@example.com", "Ada", pair("a1", "r1"))
            .unwrap();

        assert_eq!(user.provider_id, "sub-1");
        assert_eq!(user.credential_state, CredentialState::Granted);
        assert_eq!(resolver.credentials().list().unwrap().len(), 1);
    }

    #[test]
    fn test_second_login_overwrites_credential() {
        let resolver = resolver();
        let first = resolver
            .resolve("sub-1", "ada@example.com", "Ada", pair("a1", "r1"))
            .unwrap();
        let second = resolver
            .resolve("sub-1", "ada@new.example.com", "Ada L.", pair("a2", "r2"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "ada@new.example.com");
        assert_eq!(second.credential.access_token.as_deref(), Some("a2"));
        assert_eq!(second.credential.refresh_token.as_deref(), Some("r2"));
        assert_eq!(resolver.credentials().list().unwrap().len(), 1);
    }

    #[test]
    fn test_login_clears_reauth_required() {
        let resolver = resolver();
        let user = resolver
            .resolve("sub-1", "a@example.com", "A", pair("a1", "r1"))
            .unwrap();
        assert!(resolver
            .credentials()
            .require_reauth(&user.id, &user.credential)
            .unwrap());

        let again = resolver
            .resolve("sub-1", "a@example.com", "A", pair("a2", "r2"))
            .unwrap();
        assert_eq!(again.credential_state, CredentialState::Granted);
    }

    #[test]
    fn test_concurrent_first_logins_converge_on_one_user() {
        let resolver = resolver();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    resolver
                        .resolve("sub-race", "r@example.com", "R", pair(&format!("a{}", n), "r"))
                        .map(|u| u.id)
                })
            })
            .collect();

        let ids: Vec<UserId> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(resolver.credentials().list().unwrap().len(), 1);
    }

    #[test]
    fn test_login_and_current_user() {
        let resolver = resolver();
        let profile = ProviderProfile {
            sub: "sub-9".to_string(),
            email: "nine@example.com".to_string(),
            name: "Nine".to_string(),
        };

        let (user, session) = resolver.login(&profile, pair("a", "r")).unwrap();
        let current = resolver.current_user(&session.id).unwrap().unwrap();
        assert_eq!(current.id, user.id);
        assert_eq!(current.display_name, "Nine");

        resolver.logout(&session.id).unwrap();
        assert!(resolver.current_user(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_session_is_no_user() {
        let resolver = resolver();
        assert!(resolver.current_user("no-such-session").unwrap().is_none());
        assert!(resolver.credentials().list().unwrap().is_empty());
    }

    #[test]
    fn test_expired_session_is_no_user() {
        let resolver = resolver().with_session_ttl(Duration::seconds(-1));
        let profile = ProviderProfile {
            sub: "sub-x".to_string(),
            email: "x@example.com".to_string(),
            name: String::new(),
        };
        let (_, session) = resolver.login(&profile, pair("a", "r")).unwrap();
        assert!(resolver.current_user(&session.id).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_repeated_logins_keep_one_user(
            tokens in proptest::collection::vec(("[a-z0-9]{1,12}", "[a-z0-9]{1,12}"), 1..6)
        ) {
            let resolver = resolver();
            let mut ids = Vec::new();
            for (access, refresh) in &tokens {
                let user = resolver
                    .resolve("sub-p", "p@example.com", "P", pair(access, refresh))
                    .unwrap();
                ids.push(user.id);
            }

            prop_assert!(ids.windows(2).all(|w| w[0] == w[1]));
            let stored = resolver.credentials().find_by_provider_id("sub-p").unwrap().unwrap();
            let (last_access, last_refresh) = tokens.last().unwrap();
            prop_assert_eq!(stored.credential.access_token.as_deref(), Some(last_access.as_str()));
            prop_assert_eq!(stored.credential.refresh_token.as_deref(), Some(last_refresh.as_str()));
            prop_assert_eq!(resolver.credentials().list().unwrap().len(), 1);
        }
    }
}
