//! Common error types for Letterbox.

use thiserror::Error;

/// Top-level error type for Letterbox operations.
///
/// Remote provider failures are re-expressed as one of these variants at the
/// component boundary; raw HTTP or OAuth errors never leave the crate that
/// produced them.
#[derive(Debug, Error)]
pub enum Error {
    /// No valid session accompanies the request.
    #[error("Not authenticated")]
    AuthenticationRequired,

    /// Session is valid but there is no usable remote-provider credential.
    #[error("Authorization required: {0}")]
    AuthorizationRequired(String),

    /// The remote provider rejected the access token (HTTP 401).
    ///
    /// Consumed by the token lifecycle manager, which turns it into a refresh
    /// attempt or into `AuthorizationRequired`.
    #[error("Provider rejected credential: {0}")]
    ProviderUnauthorized(String),

    /// The remote provider rejected a call for any other reason.
    #[error("Remote provider error: {message}")]
    RemoteProvider {
        /// HTTP status returned by the provider, if a response was received.
        status: Option<u16>,
        /// Provider-supplied message, passed through for diagnostics.
        message: String,
    },

    /// Resource not found, or not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent first-provisioning lost the uniqueness race.
    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    /// Local persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a provider error from an HTTP status and message.
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteProvider {
            status,
            message: message.into(),
        }
    }

    /// Whether this error means the provider refused the current access token.
    pub fn is_provider_unauthorized(&self) -> bool {
        matches!(self, Error::ProviderUnauthorized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_message() {
        assert_eq!(Error::AuthenticationRequired.to_string(), "Not authenticated");
    }

    #[test]
    fn test_provider_unauthorized_detection() {
        assert!(Error::ProviderUnauthorized("expired".into()).is_provider_unauthorized());
        assert!(!Error::remote(Some(403), "quota").is_provider_unauthorized());
    }

    #[test]
    fn test_remote_error_keeps_provider_message() {
        let err = Error::remote(Some(403), "The user has exceeded their Drive storage quota");
        assert!(err.to_string().contains("storage quota"));
        match err {
            Error::RemoteProvider { status, .. } => assert_eq!(status, Some(403)),
            _ => panic!("expected RemoteProvider"),
        }
    }
}
