//! API key check for the control API
//!
//! When `api.api_key` is configured every request must carry it in the
//! `X-Api-Key` header; anything else is answered with 401 and a JSON body
//! shaped like every other API error.

use crate::error::{ApiError, ErrorDetail};
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const HEADER: &str = "x-api-key";

/// The key requests must present
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    /// Wrap the configured key
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// Compare in time independent of where the first difference is
    fn matches(&self, provided: &str) -> bool {
        let expected = self.0.as_bytes();
        let provided = provided.as_bytes();
        if expected.len() != provided.len() {
            return false;
        }
        expected
            .iter()
            .zip(provided)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Middleware rejecting requests without the configured key
///
/// ```no_run
/// use axum::{Router, middleware};
/// use batch_uploader::api::auth::{ApiKey, require_api_key};
///
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(ApiKey::new("s3cret"), require_api_key));
/// ```
pub async fn require_api_key(State(key): State<ApiKey>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(provided) if key.matches(provided) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with wrong API key");
            unauthorized("invalid API key")
        }
        None => unauthorized("missing X-Api-Key header"),
    }
}

fn unauthorized(message: &str) -> Response {
    let body = ApiError {
        error: ErrorDetail {
            code: "unauthorized".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
