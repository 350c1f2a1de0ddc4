//! Mapping of the error taxonomy onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use letterbox_common::Error;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    /// Underlying cause, for remote provider and authorization failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError {
    source: Error,
    /// Message used when the failure is on our side or the provider's.
    failure_message: &'static str,
}

impl ApiError {
    /// Replace the generic message reported for server-side failures.
    pub fn with_message(mut self, message: &'static str) -> Self {
        self.failure_message = message;
        self
    }

    pub fn source(&self) -> &Error {
        &self.source
    }

    fn status_and_body(&self) -> (StatusCode, ErrorResponse) {
        match &self.source {
            Error::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    message: "Not authenticated".to_string(),
                    error: None,
                },
            ),
            Error::AuthorizationRequired(cause) | Error::ProviderUnauthorized(cause) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    message: "Google Drive access not authorized".to_string(),
                    error: Some(cause.clone()),
                },
            ),
            Error::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    message: message.clone(),
                    error: None,
                },
            ),
            Error::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    message: message.clone(),
                    error: None,
                },
            ),
            Error::RemoteProvider { message, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    message: self.failure_message.to_string(),
                    error: Some(message.clone()),
                },
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    message: self.failure_message.to_string(),
                    error: None,
                },
            ),
        }
    }
}

impl From<Error> for ApiError {
    fn from(source: Error) -> Self {
        Self {
            source,
            failure_message: "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            error!("{}: {}", self.failure_message, self.source);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self.source);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let (status, body) = err.status_and_body();
        (status, serde_json::to_value(body).unwrap())
    }

    #[test]
    fn test_unauthenticated() {
        let (status, body) = render(Error::AuthenticationRequired.into());
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "message": "Not authenticated" }));
    }

    #[test]
    fn test_unauthorized_for_drive() {
        let (status, body) = render(Error::AuthorizationRequired("never granted".into()).into());
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Google Drive access not authorized");
    }

    #[test]
    fn test_provider_message_passed_through() {
        let err = ApiError::from(Error::remote(Some(403), "Rate limit exceeded"))
            .with_message("Error saving to Google Drive");
        let (status, body) = render(err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error saving to Google Drive");
        assert_eq!(body["error"], "Rate limit exceeded");
    }

    #[test]
    fn test_storage_details_not_exposed() {
        let (status, body) = render(Error::Storage("disk I/O error".into()).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("error").is_none());
    }
}
