use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use constant_time_eq::constant_time_eq;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The shared secret every request must present.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Constant-time for equal-length inputs; a length mismatch returns
    /// early without inspecting contents.
    pub fn matches(&self, presented: &str) -> bool {
        !self.0.is_empty() && constant_time_eq(self.0.as_bytes(), presented.as_bytes())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Keys offered by the request: `X-API-Key` first, then a bearer token.
fn presented_keys(headers: &HeaderMap) -> Vec<&str> {
    let api_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    api_key.into_iter().chain(bearer).collect()
}

pub async fn require_api_key(
    State(key): State<ApiKey>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let offered = presented_keys(request.headers());
    if offered.is_empty() {
        warn!(path = %request.uri().path(), "Request without credentials");
        return Err(ApiError::unauthorized("missing API key"));
    }
    if !offered.iter().any(|candidate| key.matches(candidate)) {
        warn!(path = %request.uri().path(), "Request with invalid API key");
        return Err(ApiError::unauthorized("invalid API key"));
    }
    Ok(next.run(request).await)
}
