use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::{self};
use axum::middleware::Next;
use axum::response::Response;

use super::handlers::ApiError;
use crate::domain::user::models::AuthenticatedUser;
use crate::domain::user::models::Limiter;
use crate::domain::user::models::Role;
use crate::inbound::http::router::AppState;
use crate::user::errors::AuthError;

/// Middleware that resolves the bearer token to a user and stores it in
/// request extensions as [`AuthenticatedUser`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token_from_header(&req)?.to_owned();

    let user = state.auth_service.authenticate(&token).await?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Middleware rejecting callers without the admin role. Must run after
/// [`authenticate`].
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or(AuthError::Unauthenticated)?;

    state.auth_service.authorize(user, Role::Admin)?;

    Ok(next.run(req).await)
}

/// Middleware applying a named limiter, keyed by client address.
pub async fn rate_limit(
    State((state, limiter)): State<(AppState, Limiter)>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let subject = client_address(&req);

    state
        .auth_service
        .enforce_rate_limit(limiter, &subject)
        .inspect_err(|e| {
            tracing::warn!(
                limiter = limiter.name(),
                %subject,
                retry_after_secs = e.retry_after_secs,
                "Request rate limited"
            );
        })?;

    Ok(next.run(req).await)
}

fn client_address(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_token_from_header(req: &Request) -> Result<&str, ApiError> {
    let auth_str = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::Unauthenticated)?;

    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Unauthenticated.into())
}
