//! Token lifecycle: the single place where access tokens are refreshed.
//!
//! A call moves through the credential states as follows:
//!
//! ```text
//! Unauthorized ──(no access token)──────────────────────────> AuthorizationRequired
//! Granted ──action──> ok
//!    │ 401
//!    v
//! Stale ──(refresh token, first refresh)──> Refreshing ──ok──> Granted ──retry once──> result
//!    │                                          │
//!    └──(no refresh token)───────────┬──────────┘ failed
//!                                    v
//!                              ReauthRequired (persisted until the next login)
//! ```
//!
//! `Stale` and `Refreshing` exist only for the duration of one call.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use letterbox_common::{CredentialState, Error, Result, TokenPair, UserId};
use letterbox_drive::TokenRefresher;
use letterbox_storage::CredentialStore;

/// Supplies a usable access token for a user and owns the refresh policy.
#[derive(Clone)]
pub struct TokenLifecycle {
    credentials: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
}

impl TokenLifecycle {
    pub fn new(credentials: CredentialStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            credentials,
            refresher,
        }
    }

    /// Run `action` with the user's access token.
    ///
    /// At most one refresh and one retry happen per call. A refresh made
    /// because the stored expiry has already passed counts as that refresh.
    ///
    /// # Errors
    /// - `AuthenticationRequired` if the user no longer exists
    /// - `AuthorizationRequired` if no usable credential exists or the
    ///   provider keeps rejecting it
    /// - Whatever `action` returns for failures other than a provider 401
    pub async fn with_credential<T, F, Fut>(&self, user_id: &UserId, action: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let user = self
            .credentials
            .find_by_id(user_id)?
            .ok_or(Error::AuthenticationRequired)?;

        if user.credential_state == CredentialState::ReauthRequired {
            debug!("User {} must consent again before remote access", user_id);
            return Err(Error::AuthorizationRequired(
                "Google Drive access must be granted again".to_string(),
            ));
        }
        if !user.credential.has_access_token() {
            debug!("User {} is {}", user_id, CredentialState::Unauthorized);
            return Err(Error::AuthorizationRequired(
                "Google Drive access has not been granted".to_string(),
            ));
        }

        let mut tokens = user.credential.clone();
        let mut refreshed = false;
        if tokens.is_expired() && tokens.has_refresh_token() {
            debug!("Access token for user {} is past its expiry", user_id);
            let cause = Error::AuthorizationRequired("Access token expired".to_string());
            tokens = self.refresh(user_id, &tokens, cause).await?;
            refreshed = true;
        }

        match action(access_token(&tokens)).await {
            Err(e) if e.is_provider_unauthorized() => {
                debug!("Credential for user {} is {}", user_id, CredentialState::Stale);
                if refreshed {
                    return Err(authorization_failure(e));
                }

                let fresh = if tokens.has_refresh_token() {
                    self.refresh(user_id, &tokens, e).await?
                } else {
                    warn!("User {} has no refresh token", user_id);
                    self.require_reauth(user_id, &tokens, e)?
                };
                action(access_token(&fresh)).await.map_err(|e| {
                    if e.is_provider_unauthorized() {
                        authorization_failure(e)
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    /// Mint and persist a new pair. On failure the user is marked
    /// `ReauthRequired` and `cause` is returned as the authorization failure.
    ///
    /// If a login replaced the stored pair while the refresh was in flight,
    /// the login's pair wins and is returned instead.
    async fn refresh(&self, user_id: &UserId, tokens: &TokenPair, cause: Error) -> Result<TokenPair> {
        debug!("Credential for user {} is {}", user_id, CredentialState::Refreshing);
        let refresh_token = tokens.refresh_token.as_deref().unwrap_or_default();

        match self.refresher.refresh(refresh_token).await {
            Ok(fresh) => {
                let fresh = if fresh.has_refresh_token() {
                    fresh
                } else {
                    TokenPair::new(
                        access_token(&fresh),
                        tokens.refresh_token.clone(),
                        fresh.expires_at,
                    )
                };
                if self.credentials.update_tokens(user_id, tokens, &fresh)? {
                    info!("Refreshed credential for user {}", user_id);
                    Ok(fresh)
                } else {
                    self.newer_credential(user_id, cause)
                }
            }
            Err(e) => {
                warn!("Token refresh failed for user {}: {}", user_id, e);
                self.require_reauth(user_id, tokens, cause)
            }
        }
    }

    /// Persist `ReauthRequired` for `tokens` and fail with `cause`, unless a
    /// login has already replaced them.
    fn require_reauth(&self, user_id: &UserId, tokens: &TokenPair, cause: Error) -> Result<TokenPair> {
        if self.credentials.require_reauth(user_id, tokens)? {
            return Err(authorization_failure(cause));
        }
        self.newer_credential(user_id, cause)
    }

    /// The pair a concurrent login stored, if it is usable.
    fn newer_credential(&self, user_id: &UserId, cause: Error) -> Result<TokenPair> {
        match self.credentials.find_by_id(user_id)? {
            Some(user)
                if user.credential_state == CredentialState::Granted
                    && user.credential.has_access_token() =>
            {
                info!("Using credential from a concurrent login for user {}", user_id);
                Ok(user.credential)
            }
            _ => Err(authorization_failure(cause)),
        }
    }
}

fn access_token(tokens: &TokenPair) -> String {
    tokens.access_token.clone().unwrap_or_default()
}

fn authorization_failure(cause: Error) -> Error {
    match cause {
        Error::ProviderUnauthorized(message) | Error::AuthorizationRequired(message) => {
            Error::AuthorizationRequired(message)
        }
        other => Error::AuthorizationRequired(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use letterbox_storage::{Database, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRefresher {
        calls: AtomicUsize,
        outcome: Option<TokenPair>,
    }

    impl FakeRefresher {
        fn succeeding(access: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: Some(TokenPair::new(access, None, Some(Utc::now() + Duration::hours(1)))),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Some(pair) => Ok(pair.clone()),
                None => Err(Error::AuthorizationRequired("invalid_grant".to_string())),
            }
        }
    }

    /// Logs the user in again while a refresh is in flight.
    struct LoginDuringRefresh {
        store: CredentialStore,
        outcome: Option<TokenPair>,
    }

    #[async_trait]
    impl TokenRefresher for LoginDuringRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair> {
            let login = TokenPair::new("login-new", Some("login-refresh".to_string()), None);
            self.store.update_login("sub", "u@example.com", "U", &login)?;
            match &self.outcome {
                Some(pair) => Ok(pair.clone()),
                None => Err(Error::AuthorizationRequired("invalid_grant".to_string())),
            }
        }
    }

    fn store_with(tokens: TokenPair) -> (CredentialStore, UserId) {
        let store = CredentialStore::new(Database::in_memory().unwrap());
        let user = UserIdentity::provision("sub", "u@example.com", "U", tokens);
        store.insert(&user).unwrap();
        (store, user.id)
    }

    fn setup(tokens: TokenPair, refresher: Arc<FakeRefresher>) -> (TokenLifecycle, CredentialStore, UserId) {
        let (store, user) = store_with(tokens);
        (TokenLifecycle::new(store.clone(), refresher), store, user)
    }

    fn racing_login(outcome: Option<TokenPair>) -> (TokenLifecycle, CredentialStore, UserId) {
        let (store, user) = store_with(granted());
        let refresher = Arc::new(LoginDuringRefresh {
            store: store.clone(),
            outcome,
        });
        (TokenLifecycle::new(store.clone(), refresher), store, user)
    }

    fn granted() -> TokenPair {
        TokenPair::new("old", Some("refresh".to_string()), None)
    }

    /// Succeeds only with the refreshed token.
    async fn accepts_fresh(token: String) -> Result<String> {
        accepts("fresh", token).await
    }

    async fn accepts(expected: &str, token: String) -> Result<String> {
        if token == expected {
            Ok(format!("ok with {}", token))
        } else {
            Err(Error::ProviderUnauthorized("Invalid Credentials".to_string()))
        }
    }

    #[tokio::test]
    async fn test_absent_access_token_makes_no_calls() {
        let refresher = FakeRefresher::succeeding("fresh");
        let (lifecycle, _, user) = setup(TokenPair::empty(), refresher.clone());
        let actions = AtomicUsize::new(0);

        let err = lifecycle
            .with_credential(&user, |t| {
                actions.fetch_add(1, Ordering::SeqCst);
                accepts_fresh(t)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(actions.load(Ordering::SeqCst), 0);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_is_used_without_refresh() {
        let refresher = FakeRefresher::succeeding("unused");
        let (lifecycle, _, user) = setup(
            TokenPair::new("fresh", Some("refresh".to_string()), None),
            refresher.clone(),
        );

        let result = lifecycle.with_credential(&user, accepts_fresh).await.unwrap();
        assert_eq!(result, "ok with fresh");
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_retries_once() {
        let refresher = FakeRefresher::succeeding("fresh");
        let (lifecycle, store, user) = setup(granted(), refresher.clone());
        let actions = AtomicUsize::new(0);

        let result = lifecycle
            .with_credential(&user, |t| {
                actions.fetch_add(1, Ordering::SeqCst);
                accepts_fresh(t)
            })
            .await
            .unwrap();

        assert_eq!(result, "ok with fresh");
        assert_eq!(actions.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.calls(), 1);

        let stored = store.find_by_id(&user).unwrap().unwrap();
        assert_eq!(stored.credential.access_token.as_deref(), Some("fresh"));
        // The refresher returned no refresh token; the old one is kept.
        assert_eq!(stored.credential.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(stored.credential_state, CredentialState::Granted);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_terminal_until_login() {
        let refresher = FakeRefresher::failing();
        let (lifecycle, store, user) = setup(granted(), refresher.clone());
        let actions = AtomicUsize::new(0);
        let action = |t| {
            actions.fetch_add(1, Ordering::SeqCst);
            accepts_fresh(t)
        };

        let err = lifecycle.with_credential(&user, action).await.unwrap_err();
        match err {
            Error::AuthorizationRequired(message) => assert_eq!(message, "Invalid Credentials"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(actions.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(
            store.find_by_id(&user).unwrap().unwrap().credential_state,
            CredentialState::ReauthRequired
        );

        // No further refresh or remote call while re-consent is pending.
        let err = lifecycle.with_credential(&user, action).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(actions.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.calls(), 1);

        // A new login persists a new pair and lifts the block.
        store
            .update_login("sub", "u@example.com", "U", &TokenPair::new("fresh", Some("r2".into()), None))
            .unwrap();
        let result = lifecycle.with_credential(&user, action).await.unwrap();
        assert_eq!(result, "ok with fresh");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_rejected_again_does_not_refresh_twice() {
        let refresher = FakeRefresher::succeeding("also-rejected");
        let (lifecycle, _, user) = setup(granted(), refresher.clone());
        let actions = AtomicUsize::new(0);

        let err = lifecycle
            .with_credential(&user, |t| {
                actions.fetch_add(1, Ordering::SeqCst);
                accepts_fresh(t)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(actions.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_requires_reauth() {
        let refresher = FakeRefresher::succeeding("fresh");
        let (lifecycle, store, user) = setup(TokenPair::new("old", None, None), refresher.clone());

        let err = lifecycle.with_credential(&user, accepts_fresh).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(refresher.calls(), 0);
        assert_eq!(
            store.find_by_id(&user).unwrap().unwrap().credential_state,
            CredentialState::ReauthRequired
        );
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_before_use() {
        let refresher = FakeRefresher::succeeding("fresh");
        let expired = TokenPair::new(
            "old",
            Some("refresh".to_string()),
            Some(Utc::now() - Duration::minutes(1)),
        );
        let (lifecycle, _, user) = setup(expired, refresher.clone());
        let actions = AtomicUsize::new(0);

        let result = lifecycle
            .with_credential(&user, |t| {
                actions.fetch_add(1, Ordering::SeqCst);
                accepts_fresh(t)
            })
            .await
            .unwrap();

        assert_eq!(result, "ok with fresh");
        assert_eq!(actions.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_proactive_refresh_counts_as_the_only_refresh() {
        let refresher = FakeRefresher::succeeding("still-rejected");
        let expired = TokenPair::new(
            "old",
            Some("refresh".to_string()),
            Some(Utc::now() - Duration::minutes(1)),
        );
        let (lifecycle, _, user) = setup(expired, refresher.clone());

        let err = lifecycle.with_credential(&user, accepts_fresh).await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_other_provider_errors_pass_through() {
        let refresher = FakeRefresher::succeeding("fresh");
        let (lifecycle, store, user) = setup(granted(), refresher.clone());

        let err = lifecycle
            .with_credential(&user, |_| async {
                Err::<(), _>(Error::remote(Some(403), "quota exceeded"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RemoteProvider { status: Some(403), .. }));
        assert_eq!(refresher.calls(), 0);
        assert_eq!(
            store.find_by_id(&user).unwrap().unwrap().credential_state,
            CredentialState::Granted
        );
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthenticated() {
        let (lifecycle, _, _) = setup(granted(), FakeRefresher::succeeding("fresh"));
        let err = lifecycle
            .with_credential(&UserId::generate(), accepts_fresh)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_failed_proactive_refresh_requires_reauth() {
        let refresher = FakeRefresher::failing();
        let expired = TokenPair::new(
            "old",
            Some("refresh".to_string()),
            Some(Utc::now() - Duration::minutes(1)),
        );
        let (lifecycle, store, user) = setup(expired, refresher.clone());
        let actions = AtomicUsize::new(0);

        let err = lifecycle
            .with_credential(&user, |t| {
                actions.fetch_add(1, Ordering::SeqCst);
                accepts_fresh(t)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthorizationRequired(_)));
        assert_eq!(actions.load(Ordering::SeqCst), 0);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(
            store.find_by_id(&user).unwrap().unwrap().credential_state,
            CredentialState::ReauthRequired
        );
    }

    #[tokio::test]
    async fn test_login_during_failed_refresh_keeps_new_grant() {
        let (lifecycle, store, user) = racing_login(None);

        let result = lifecycle
            .with_credential(&user, |t| accepts("login-new", t))
            .await
            .unwrap();
        assert_eq!(result, "ok with login-new");

        let stored = store.find_by_id(&user).unwrap().unwrap();
        assert_eq!(stored.credential_state, CredentialState::Granted);
        assert_eq!(stored.credential.access_token.as_deref(), Some("login-new"));
        assert_eq!(stored.credential.refresh_token.as_deref(), Some("login-refresh"));
    }

    #[tokio::test]
    async fn test_login_during_successful_refresh_is_not_overwritten() {
        let from_old = TokenPair::new("refreshed-from-old", None, None);
        let (lifecycle, store, user) = racing_login(Some(from_old));
        let seen = std::sync::Mutex::new(Vec::new());

        let result = lifecycle
            .with_credential(&user, |t| {
                seen.lock().unwrap().push(t.clone());
                accepts("login-new", t)
            })
            .await
            .unwrap();
        assert_eq!(result, "ok with login-new");
        assert_eq!(*seen.lock().unwrap(), vec!["old", "login-new"]);

        let stored = store.find_by_id(&user).unwrap().unwrap();
        assert_eq!(stored.credential_state, CredentialState::Granted);
        assert_eq!(stored.credential.access_token.as_deref(), Some("login-new"));
        assert_eq!(stored.credential.refresh_token.as_deref(), Some("login-refresh"));
    }
}
