use axum::http::HeaderMap;
use tracing::warn;

use crate::errors::AppError;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

/// Extracts the instance bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(auth) = header_value(headers, "authorization")
        && let Some(token) = auth.strip_prefix("Bearer ")
    {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_owned());
        }
    }

    warn!("auth rejected: missing bearer token");
    Err(AppError::unauthorized("Missing bearer token"))
}
