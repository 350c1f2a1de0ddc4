//! OAuth2 authentication and token management for Google.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    reqwest as oauth_reqwest, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use letterbox_common::{Error, Result, TokenPair};

use crate::provider::TokenRefresher;

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// OpenID Connect userinfo endpoint.
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
/// Redirect URL for the OAuth2 callback during local development.
const REDIRECT_URL: &str = "http://localhost:5000/auth/provider/callback";

/// Scopes requested at consent: identity plus per-file Drive access.
const SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/drive.file",
];

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URL registered for the OAuth2 callback.
    pub redirect_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

impl AuthConfig {
    /// Configuration against Google's production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            ..Self::default()
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: REDIRECT_URL.to_string(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
        }
    }
}

/// Identity assertion returned by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderProfile {
    /// Stable subject identifier.
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl ProviderProfile {
    /// Display name, falling back to the email when the profile has none.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// OAuth2 authentication manager for Google.
pub struct AuthManager {
    client: GoogleOAuthClient,
    /// Client for the token endpoint. Redirects are disabled to avoid SSRF.
    token_http: oauth_reqwest::Client,
    /// Client for the userinfo endpoint.
    http: reqwest::Client,
    config: AuthConfig,
}

impl AuthManager {
    /// Create a new authentication manager.
    ///
    /// # Errors
    /// - Any configured URL is malformed
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?,
            );

        let token_http = oauth_reqwest::ClientBuilder::new()
            .redirect(oauth_reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("Letterbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_http,
            http,
            config,
        })
    }

    /// Generate the consent URL for the user to visit.
    ///
    /// Returns the URL and a CSRF token that must be verified on callback.
    /// Offline access with a forced consent prompt makes Google return a
    /// refresh token on every login, not only the first.
    pub fn authorization_url(&self) -> (String, String) {
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (auth_url, csrf_token) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        (auth_url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// A missing refresh token is not an error: the pair is stored as-is and
    /// remote access ends when the access token expires.
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.token_http)
            .await
            .map_err(|e| Error::AuthorizationRequired(format!("Token exchange failed: {}", e)))?;

        let refresh_token = token_result.refresh_token().map(|t| t.secret().clone());
        if refresh_token.is_none() {
            warn!("Token exchange returned no refresh token");
        }

        Ok(TokenPair::new(
            token_result.access_token().secret().clone(),
            refresh_token,
            expiry_from(token_result.expires_in()),
        ))
    }

    /// Refresh an access token using the refresh token.
    ///
    /// Google usually omits the refresh token from refresh responses; the
    /// existing one is carried over in that case.
    ///
    /// # Errors
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.token_http)
            .await
            .map_err(|e| Error::AuthorizationRequired(format!("Token refresh failed: {}", e)))?;

        let new_refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or_else(|| refresh_token.to_string());

        info!("Access token refreshed");
        Ok(TokenPair::new(
            token_result.access_token().secret().clone(),
            Some(new_refresh_token),
            expiry_from(token_result.expires_in()),
        ))
    }

    /// Fetch the identity of the user the access token belongs to.
    ///
    /// # Errors
    /// - `ProviderUnauthorized` if the token is rejected
    /// - `RemoteProvider` for any other failure
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| Error::remote(None, format!("Failed to fetch profile: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::ProviderUnauthorized(
                "Userinfo rejected access token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(Some(status.as_u16()), body));
        }

        let profile: ProviderProfile = response
            .json()
            .await
            .map_err(|e| Error::remote(None, format!("Failed to parse profile: {}", e)))?;

        if profile.sub.is_empty() {
            return Err(Error::remote(None, "Profile has no subject identifier"));
        }
        Ok(profile)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[async_trait]
impl TokenRefresher for AuthManager {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.refresh_token(refresh_token).await
    }
}

fn expiry_from(expires_in: Option<std::time::Duration>) -> Option<chrono::DateTime<Utc>> {
    expires_in
        .and_then(|d| Duration::from_std(d).ok())
        .map(|d| Utc::now() + d)
}
