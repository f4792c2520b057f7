use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;

use super::ApiError;
use super::ApiSuccess;
use crate::domain::user::models::AuthenticatedUser;
use crate::domain::user::models::LogoutScope;
use crate::inbound::http::router::AppState;

pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(body): Json<LogoutRequest>,
) -> Result<ApiSuccess<LogoutResponseData>, ApiError> {
    let scope = match body.scope.as_deref() {
        Some(scope) => scope.parse::<LogoutScope>()?,
        None => LogoutScope::Single,
    };

    state
        .auth_service
        .logout(&caller.id(), scope, body.refresh_token.as_deref())
        .await
        .map_err(ApiError::from)
        .map(|revoked| ApiSuccess::new(StatusCode::OK, LogoutResponseData { revoked }))
}

/// `scope` is `single` (default, needs `refresh_token`) or `all`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutResponseData {
    pub revoked: usize,
}
