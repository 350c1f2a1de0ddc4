//! Common types used throughout Letterbox.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroize;

/// Access tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// Unique identifier for a user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Generate a fresh identifier for a newly provisioned user.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "UserId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a local letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LetterId(String);

impl LetterId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "LetterId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LetterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access/refresh token pair authorizing provider calls on a user's behalf.
///
/// Token strings are zeroized on drop and redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct TokenPair {
    /// Short-lived bearer credential.
    pub access_token: Option<String>,
    /// Long-lived credential used to mint new access tokens.
    pub refresh_token: Option<String>,
    /// When the access token expires, if the token endpoint said so.
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Pair with both tokens and an optional expiry.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            expires_at,
        }
    }

    /// Pair with no tokens, as created at provisioning.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Check if the access token is known to be expired or about to expire.
    ///
    /// A pair without an expiry is never considered expired; the provider's
    /// 401 is the only signal in that case.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at < Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES),
            None => false,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where a user's remote credential stands.
///
/// `Unauthorized` is derived from an absent access token. `Granted` and
/// `ReauthRequired` are persisted. `Stale` and `Refreshing` only exist for the
/// duration of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialState {
    /// No tokens at all.
    Unauthorized,
    /// Access token present.
    Granted,
    /// The provider returned 401 for the current access token.
    Stale,
    /// A new access token is being minted from the refresh token.
    Refreshing,
    /// Refresh failed or impossible; terminal until the user consents again.
    ReauthRequired,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Granted => "GRANTED",
            Self::Stale => "STALE",
            Self::Refreshing => "REFRESHING",
            Self::ReauthRequired => "REAUTH_REQUIRED",
        }
    }

    /// Parse the persisted form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "UNAUTHORIZED" => Ok(Self::Unauthorized),
            "GRANTED" => Ok(Self::Granted),
            "STALE" => Ok(Self::Stale),
            "REFRESHING" => Ok(Self::Refreshing),
            "REAUTH_REQUIRED" => Ok(Self::ReauthRequired),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown credential state: {}",
                other
            ))),
        }
    }

    /// Initial state for a freshly stored token pair.
    pub fn for_tokens(tokens: &TokenPair) -> Self {
        if tokens.has_access_token() {
            Self::Granted
        } else {
            Self::Unauthorized
        }
    }
}

impl fmt::Display for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
