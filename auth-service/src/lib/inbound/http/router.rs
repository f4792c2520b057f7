use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::middleware;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::handlers::list_users::list_users;
use super::handlers::login::login;
use super::handlers::logout::logout;
use super::handlers::me::me;
use super::handlers::refresh::refresh;
use super::handlers::register::register;
use super::handlers::update_role::update_role;
use super::middleware::authenticate;
use super::middleware::rate_limit;
use super::middleware::require_admin;
use crate::domain::user::models::Limiter;
use crate::domain::user::ports::AuthServicePort;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<dyn AuthServicePort>,
}

pub fn create_router(auth_service: Arc<dyn AuthServicePort>) -> Router {
    let state = AppState { auth_service };

    let public_routes = Router::new()
        .route(
            "/api/auth/register",
            post(register).route_layer(middleware::from_fn_with_state(
                (state.clone(), Limiter::Register),
                rate_limit,
            )),
        )
        .route(
            "/api/auth/login",
            post(login).route_layer(middleware::from_fn_with_state(
                (state.clone(), Limiter::Login),
                rate_limit,
            )),
        )
        .route("/api/auth/refresh", post(refresh));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    // Layers run outermost first: authenticate, then require_admin, then
    // the per-route limiter.
    let admin_routes = Router::new()
        .route(
            "/api/admin/users",
            get(list_users).route_layer(middleware::from_fn_with_state(
                (state.clone(), Limiter::AdminListing),
                rate_limit,
            )),
        )
        .route("/api/admin/users/:user_id/role", patch(update_role))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        })
        .on_request(|request: &Request<Body>, _span: &Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "Request started"
            );
        })
        .on_response(
            |response: &Response<Body>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis(),
                    "Request completed"
                );
            },
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use auth::Authenticator;
    use auth::AuthenticatorSettings;
    use auth::PasswordHasher;
    use auth::RateLimitPolicy;
    use auth::SystemClock;
    use axum::http::header;
    use axum::http::Method;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::user::models::RateLimitPolicies;
    use crate::domain::user::service::AuthService;
    use crate::outbound::repositories::InMemoryCredentialStore;

    fn router(rate_limits: RateLimitPolicies) -> Router {
        let settings = AuthenticatorSettings {
            password_hasher: PasswordHasher::with_params(1024, 1, 1).unwrap(),
            ..AuthenticatorSettings::default()
        };
        let authenticator = Authenticator::with_settings(
            b"router_test_secret_at_least_32_bytes",
            settings,
            Arc::new(SystemClock),
        )
        .unwrap();

        create_router(Arc::new(AuthService::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(authenticator),
            rate_limits,
            Arc::new(SystemClock),
        )))
    }

    fn register_request(email: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"email":"{}","name":"Ann","password":"pw1"}}"#,
                email
            )))
            .unwrap()
    }

    #[tokio::test]
    async fn test_protected_routes_require_bearer_token() {
        let app = router(RateLimitPolicies::default());

        for (method, uri) in [
            (Method::GET, "/api/auth/me"),
            (Method::POST, "/api/auth/logout"),
            (Method::GET, "/api/admin/users"),
            (Method::PATCH, "/api/admin/users/x/role"),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();

            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_malformed_authorization_header() {
        let app = router(RateLimitPolicies::default());

        for value in ["Basic abc", "Bearer ", "token"] {
            let request = Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap();

            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_register_without_peer_address_is_limited_as_unknown() {
        let app = router(RateLimitPolicies {
            register: RateLimitPolicy::new(1, 60),
            ..RateLimitPolicies::default()
        });

        let response = app.clone().oneshot(register_request("a@x.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.oneshot(register_request("b@x.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
