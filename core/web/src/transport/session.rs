//! Request-scoped user resolution.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use letterbox_common::Error;
use letterbox_storage::UserIdentity;

use crate::error::ApiError;
use crate::state::AppState;

/// The user bound to the request's session cookie.
///
/// Rejects with `401 Not authenticated` when the cookie is missing, fails MAC
/// verification, or names a session that no longer exists.
pub struct CurrentUser(pub UserIdentity);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session_id = state
            .cookies
            .session_id(&parts.headers)
            .ok_or(Error::AuthenticationRequired)?;

        let user = state
            .identity
            .current_user(&session_id)?
            .ok_or(Error::AuthenticationRequired)?;

        Ok(CurrentUser(user))
    }
}
