//! Bearer-token middleware for the gateway

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::AuthedUser;
use crate::gateway::state::AppState;
use crate::gateway::types::ApiError;

/// Require a valid bearer token; injects [`AuthedUser`] into extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid token format"))?;

    let user = state
        .auth
        .verify(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Require the admin role. Must be layered inside [`require_auth`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthedUser>()
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    if !user.is_admin() {
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(next.run(request).await)
}
