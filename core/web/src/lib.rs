//! HTTP surface of Letterbox.
//!
//! Routes, session cookies and the mapping of the error taxonomy onto HTTP
//! responses. Everything behind the router lives in the identity and sync
//! crates.

pub mod config;
pub mod cookie;
pub mod error;
pub mod state;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use letterbox_common::Result;

pub use config::WebConfig;
pub use error::ApiError;
pub use state::AppState;
pub use transport::build_router;

/// How often expired sessions and abandoned logins are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Bind `addr` and serve the API until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    spawn_session_sweeper(Arc::clone(&state));
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

fn spawn_session_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match state.purge_expired() {
                Ok(removed) => debug!("Swept {} expired session rows", removed),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    });
}
