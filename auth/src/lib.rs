//! Authentication runtime library
//!
//! Provides reusable authentication infrastructure for services:
//! - Password hashing (Argon2id, configurable work factor)
//! - JWT access token issuance and verification
//! - Refresh-token session registry with single-use rotation
//! - Sliding window rate limiting
//! - An [`Authenticator`] context owning all of the above
//!
//! Each service defines its own domain traits and adapts these implementations.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::with_params(1024, 1, 1).unwrap();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash));
//! assert!(!hasher.verify("other", &hash));
//! ```
//!
//! ## JWT Tokens
//! ```
//! use auth::{Claims, JwtHandler};
//! use chrono::Duration;
//!
//! let handler = JwtHandler::new(b"secret_key_at_least_32_bytes_long!");
//! let claims = Claims::new("user123", "alice@example.com", "user");
//! let token = handler.issue(&claims, Duration::hours(1)).unwrap();
//! let decoded = handler.verify(&token).unwrap();
//! assert_eq!(decoded.sub, "user123");
//! ```
//!
//! ## Refresh Rotation
//! ```
//! use auth::{Authenticator, Claims};
//!
//! let auth: Authenticator<String> = Authenticator::new(b"secret_key_at_least_32_bytes_long!");
//! let claims = Claims::new("user123", "alice@example.com", "user");
//!
//! let pair = auth.issue_pair(&claims, "user123".to_string()).unwrap();
//! assert!(auth.consume_refresh_token(&pair.refresh_token).is_some());
//! assert!(auth.consume_refresh_token(&pair.refresh_token).is_none());
//! ```

pub mod authenticator;
pub mod clock;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

// Re-export commonly used items
pub use authenticator::AuthenticationError;
pub use authenticator::Authenticator;
pub use authenticator::AuthenticatorSettings;
pub use authenticator::TokenPair;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use jsonwebtoken::Algorithm;
pub use jwt::parse_algorithm;
pub use jwt::Claims;
pub use jwt::JwtError;
pub use jwt::JwtHandler;
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use rate_limit::RateDecision;
pub use rate_limit::RateLimitPolicy;
pub use rate_limit::RateLimiter;
pub use session::Session;
pub use session::SessionError;
pub use session::SessionRegistry;
