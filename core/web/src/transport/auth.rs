//! Login, logout and identity endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use letterbox_common::{Error, Result};
use letterbox_identity::SESSION_TTL_HOURS;

use crate::cookie::{clear_session_cookie, session_cookie};
use crate::error::ApiError;
use crate::state::AppState;
use crate::transport::session::CurrentUser;

// -- Request/Response types ---------------------------------------------------

/// Query string Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set instead of `code` when the user declined consent.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /auth/provider`: send the browser to the consent screen.
pub async fn begin_login(State(s): State<Arc<AppState>>) -> std::result::Result<Redirect, ApiError> {
    let (url, csrf_state) = s.auth.authorization_url();
    s.identity.sessions().insert_pending_login(&csrf_state)?;
    Ok(Redirect::to(&url))
}

/// `GET /auth/provider/callback`: finish the code flow and open a session.
///
/// Every failure redirects to the frontend's login page.
pub async fn complete_login(
    State(s): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match finish_login(&s, params).await {
        Ok(cookie_value) => {
            let max_age = SESSION_TTL_HOURS * 60 * 60;
            let cookie = session_cookie(&cookie_value, max_age, s.config.production);
            (
                [(header::SET_COOKIE, cookie)],
                Redirect::to(s.config.frontend_origin()),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            Redirect::to(&s.config.login_failure_url()).into_response()
        }
    }
}

async fn finish_login(s: &AppState, params: CallbackParams) -> Result<String> {
    if let Some(denied) = params.error {
        return Err(Error::AuthorizationRequired(format!("Consent not given: {}", denied)));
    }

    let csrf_state = params
        .state
        .ok_or_else(|| Error::InvalidInput("Missing state parameter".to_string()))?;
    if !s
        .identity
        .sessions()
        .take_pending_login(&csrf_state, s.pending_login_max_age())?
    {
        return Err(Error::InvalidInput("Unknown or expired state parameter".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| Error::InvalidInput("Missing authorization code".to_string()))?;

    let tokens = s.auth.exchange_code(&code).await?;
    let access_token = tokens.access_token.clone().unwrap_or_default();
    let profile = s.auth.fetch_profile(&access_token).await?;

    let (user, session) = s.identity.login(&profile, tokens)?;
    info!("Session opened for user {}", user.id);
    s.cookies.sign(&session.id)
}

/// `GET /auth/current-user`
pub async fn current_user(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        display_name: user.display_name,
    })
}

/// `POST /auth/logout`: end the session, if any, and clear the cookie.
pub async fn logout(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    if let Some(session_id) = s.cookies.session_id(&headers) {
        s.identity.logout(&session_id)?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie(s.config.production))],
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
        .into_response())
}
