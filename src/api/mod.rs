mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use handlers::{EvaluateResponse, PingResponse};
pub use state::AppState;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/metrics",
            get(handlers::metrics).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/evaluate",
            get(handlers::evaluate).fallback(handlers::method_not_allowed),
        )
        .route("/api/ping", get(handlers::ping))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router until the process is stopped.
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let address = listener.local_addr()?;
    info!(%address, "Listening");
    println!("Listening on http://{address}");

    axum::serve(listener, router(state))
        .await
        .context("Server error")
}
