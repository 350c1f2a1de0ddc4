//! Web server configuration.

use serde::{Deserialize, Serialize};

use letterbox_common::{Error, Result};

/// Minimum accepted length of the session secret.
const MIN_SECRET_LEN: usize = 16;

/// Settings for the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Origin allowed to call the API with credentials, and where the browser
    /// is sent after login.
    pub frontend_url: String,
    /// Key material for session cookie MACs.
    #[serde(skip_serializing)]
    pub session_secret: String,
    /// Mark cookies `Secure`.
    pub production: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            session_secret: String::new(),
            production: false,
        }
    }
}

impl WebConfig {
    /// Frontend URL without a trailing slash.
    pub fn frontend_origin(&self) -> &str {
        self.frontend_url.trim_end_matches('/')
    }

    /// Where a failed login lands.
    pub fn login_failure_url(&self) -> String {
        format!("{}/login", self.frontend_origin())
    }

    /// # Errors
    /// - Session secret shorter than 16 bytes
    /// - Empty frontend URL
    pub fn validate(&self) -> Result<()> {
        if self.session_secret.len() < MIN_SECRET_LEN {
            return Err(Error::Configuration(format!(
                "SESSION_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        if self.frontend_origin().is_empty() {
            return Err(Error::Configuration("FRONTEND_URL must not be empty".to_string()));
        }
        Ok(())
    }
}
