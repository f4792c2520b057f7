use std::net::SocketAddr;
use std::sync::Arc;

use auth::Authenticator;
use auth::AuthenticatorSettings;
use auth::Clock;
use auth::PasswordHasher;
use auth::RateLimitPolicy;
use auth::SystemClock;
use auth_service::domain::user::models::DisplayName;
use auth_service::domain::user::models::EmailAddress;
use auth_service::domain::user::models::NewUser;
use auth_service::domain::user::models::RateLimitPolicies;
use auth_service::domain::user::models::Role;
use auth_service::domain::user::ports::CredentialStore;
use auth_service::domain::user::service::AuthService;
use auth_service::inbound::http::router::create_router;
use auth_service::outbound::repositories::InMemoryCredentialStore;

pub const JWT_SECRET: &[u8] = b"test-secret-key-for-jwt-signing-at-least-32-bytes";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const LOGIN_LIMIT: u32 = 5;

/// Test application that spawns a real server
pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
}

impl TestApp {
    /// Spawn the application in a background task and return TestApp
    pub async fn spawn() -> Self {
        // Use random port (0 = OS assigns)
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        // Cheap work factor keeps the suite fast
        let hasher = PasswordHasher::with_params(1024, 1, 1).expect("Invalid Argon2 params");

        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .create(NewUser {
                email: EmailAddress::new(ADMIN_EMAIL.to_string()).unwrap(),
                name: DisplayName::new("Admin".to_string()).unwrap(),
                password_hash: hasher.hash(ADMIN_PASSWORD).unwrap(),
                role: Role::Admin,
            })
            .await
            .expect("Failed to seed admin");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let settings = AuthenticatorSettings {
            password_hasher: hasher,
            ..AuthenticatorSettings::default()
        };
        let authenticator = Arc::new(
            Authenticator::with_settings(JWT_SECRET, settings, Arc::clone(&clock))
                .expect("Invalid authenticator settings"),
        );

        let rate_limits = RateLimitPolicies {
            login: RateLimitPolicy::new(LOGIN_LIMIT, 60),
            ..RateLimitPolicies::default()
        };

        let auth_service = Arc::new(AuthService::new(store, authenticator, rate_limits, clock));
        let router = create_router(auth_service);

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server error");
        });

        Self {
            address,
            api_client: reqwest::Client::new(),
        }
    }

    /// Helper to make GET request
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.get(format!("{}{}", self.address, path))
    }

    /// Helper to make POST request
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.api_client.post(format!("{}{}", self.address, path))
    }

    /// Helper to make GET request with Bearer token
    pub fn get_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.get(path).bearer_auth(token)
    }

    /// Helper to make POST request with Bearer token
    pub fn post_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.post(path).bearer_auth(token)
    }

    /// Helper to make PATCH request with Bearer token
    pub fn patch_authenticated(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.api_client
            .patch(format!("{}{}", self.address, path))
            .bearer_auth(token)
    }

    /// Register a user and return the response body's `data`.
    pub async fn register(&self, email: &str, name: &str, password: &str) -> serde_json::Value {
        let response = self
            .post("/api/auth/register")
            .json(&serde_json::json!({
                "email": email,
                "name": name,
                "password": password
            }))
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(response.status(), reqwest::StatusCode::CREATED);

        let body: serde_json::Value = response.json().await.expect("Failed to parse response");
        body["data"].clone()
    }

    /// Log in and return the response.
    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post("/api/auth/login")
            .json(&serde_json::json!({
                "email": email,
                "password": password
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Log in as the seeded admin and return the access token.
    pub async fn admin_token(&self) -> String {
        let response = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = response.json().await.expect("Failed to parse response");
        body["data"]["token"].as_str().unwrap().to_string()
    }
}
