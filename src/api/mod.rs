//! REST control surface
//!
//! Exposes the run controls of a [`BatchUploader`] over HTTP so a control
//! panel (or `curl`) can start, pause, resume and stop a run, read progress
//! and results, and follow events as they happen.

use crate::{BatchUploader, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router
///
/// # Routes
///
/// ## Run control
/// - `POST /run/start` - Start a run from an input table
/// - `POST /run/pause` - Hold workers at their next checkpoint
/// - `POST /run/resume` - Continue a paused run
/// - `POST /run/stop` - Stop the run (grace period, then abort)
/// - `POST /run/reset` - Clear a finished run
/// - `GET /run/progress` - Progress snapshot
/// - `GET /run/results` - Results recorded so far
///
/// ## System
/// - `GET /network` - One reachability probe
/// - `GET /events` - Server-sent events stream
/// - `GET /health` - Health check
pub fn create_router(uploader: Arc<BatchUploader>) -> Router {
    let api = uploader.config().api.clone();
    let state = AppState::new(uploader);

    let router = Router::new()
        .route("/run/start", post(routes::start_run))
        .route("/run/pause", post(routes::pause_run))
        .route("/run/resume", post(routes::resume_run))
        .route("/run/stop", post(routes::stop_run))
        .route("/run/reset", post(routes::reset_run))
        .route("/run/progress", get(routes::get_progress))
        .route("/run/results", get(routes::get_results))
        .route("/network", get(routes::test_network))
        .route("/events", get(routes::event_stream))
        .route("/health", get(routes::health_check))
        .with_state(state);

    let router = match api.api_key {
        Some(key) => router.layer(middleware::from_fn_with_state(
            auth::ApiKey::new(key),
            auth::require_api_key,
        )),
        None => router,
    };

    let router = router.layer(TraceLayer::new_for_http());

    if api.cors_enabled {
        router.layer(build_cors_layer(&api.cors_origins))
    } else {
        router
    }
}

/// CORS for the configured origins; empty or `*` allows any origin
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Serve the API on `api.bind_address` until the process ends
///
/// # Example
///
/// ```no_run
/// use batch_uploader::{BatchUploader, Config, InMemoryRepository};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let uploader = BatchUploader::new(Config::default(), Arc::new(InMemoryRepository::new()))?;
/// batch_uploader::api::start_api_server(Arc::new(uploader)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(uploader: Arc<BatchUploader>) -> Result<()> {
    serve_until(uploader, std::future::pending()).await
}

/// Serve the API until `shutdown` completes
pub async fn serve_until<F>(uploader: Arc<BatchUploader>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = uploader.config().api.bind_address;
    let listener = TcpListener::bind(bind_address).await?;
    let local = listener.local_addr()?;
    tracing::info!(address = %local, "API server listening");

    axum::serve(listener, create_router(uploader))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
