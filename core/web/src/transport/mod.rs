//! HTTP transport: router and handlers.

pub mod auth;
pub mod http;
pub mod letters;
pub mod session;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::WebConfig;
use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Login flow
        .route("/auth/provider", get(auth::begin_login))
        .route("/auth/provider/callback", get(auth::complete_login))
        .route("/auth/current-user", get(auth::current_user))
        .route("/auth/logout", post(auth::logout))
        // Drive sync
        .route("/letters/drive/letters", get(letters::drive_letters))
        .route("/letters/{id}/save-to-drive", post(letters::save_to_drive))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Credentialed CORS for the configured frontend origin only.
fn cors_layer(config: &WebConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match HeaderValue::from_str(config.frontend_origin()) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("FRONTEND_URL is not a valid origin, CORS disabled: {}", e);
            layer
        }
    }
}
