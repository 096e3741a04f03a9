use crate::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};

/// Identity headers in order of preference. The portal in front of the API
/// authenticates users and sets one of these.
pub const IDENTITY_HEADERS: &[&str] = &["x-labvm-user", "x-forwarded-user", "x-user"];

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Auth middleware - extracts the caller from the upstream identity headers.
///
/// Requests without a non-empty identity header are rejected with 401.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let username = IDENTITY_HEADERS
        .iter()
        .filter_map(|name| req.headers().get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing identity header".to_string()))?;

    req.extensions_mut().insert(AuthenticatedUser { username });

    Ok(next.run(req).await)
}
