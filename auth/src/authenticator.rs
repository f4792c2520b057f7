use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::Algorithm;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::jwt::Claims;
use crate::jwt::JwtError;
use crate::jwt::JwtHandler;
use crate::password::PasswordError;
use crate::password::PasswordHasher;
use crate::rate_limit::RateDecision;
use crate::rate_limit::RateLimitPolicy;
use crate::rate_limit::RateLimiter;
use crate::session::Session;
use crate::session::SessionError;
use crate::session::SessionRegistry;

/// Tunables fixed at construction.
#[derive(Clone)]
pub struct AuthenticatorSettings {
    pub algorithm: Algorithm,
    pub leeway_secs: u64,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub password_hasher: PasswordHasher,
}

impl Default for AuthenticatorSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            leeway_secs: 0,
            access_token_ttl: Duration::seconds(3600),
            refresh_token_ttl: Duration::seconds(604_800),
            password_hasher: PasswordHasher::new(),
        }
    }
}

/// Access/refresh token pair handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Signed JWT access token
    pub access_token: String,
    /// Opaque single-use refresh token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Authentication operation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Password error: {0}")]
    PasswordError(#[from] PasswordError),

    #[error("JWT error: {0}")]
    JwtError(#[from] JwtError),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

/// Per-instance authentication context.
///
/// Owns the password hasher, the token handler, the refresh-token session
/// registry and the rate limiter. A service builds one at startup, shares it
/// behind an `Arc`, and drops it at shutdown; nothing here is global.
pub struct Authenticator<U> {
    password_hasher: PasswordHasher,
    jwt_handler: JwtHandler,
    sessions: SessionRegistry<U>,
    rate_limiter: RateLimiter,
    access_token_ttl: Duration,
}

impl<U> Authenticator<U>
where
    U: Clone + Eq + Hash + fmt::Display + Send + Sync,
{
    /// Create an authenticator with default settings and the system clock.
    pub fn new(jwt_secret: &[u8]) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let settings = AuthenticatorSettings::default();

        Self {
            password_hasher: settings.password_hasher,
            jwt_handler: JwtHandler::new(jwt_secret),
            sessions: SessionRegistry::new(settings.refresh_token_ttl, Arc::clone(&clock)),
            rate_limiter: RateLimiter::new(clock),
            access_token_ttl: settings.access_token_ttl,
        }
    }

    /// Create an authenticator from explicit settings and clock.
    ///
    /// # Errors
    /// * `JwtError::UnsupportedAlgorithm` - Algorithm is not in the HMAC family
    pub fn with_settings(
        jwt_secret: &[u8],
        settings: AuthenticatorSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthenticationError> {
        let jwt_handler = JwtHandler::new(jwt_secret)
            .with_algorithm(settings.algorithm)?
            .with_leeway(settings.leeway_secs)
            .with_clock(Arc::clone(&clock));

        Ok(Self {
            password_hasher: settings.password_hasher,
            jwt_handler,
            sessions: SessionRegistry::new(settings.refresh_token_ttl, Arc::clone(&clock)),
            rate_limiter: RateLimiter::new(clock),
            access_token_ttl: settings.access_token_ttl,
        })
    }

    /// Access token lifetime in seconds.
    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    /// Hash a password for storage.
    ///
    /// # Errors
    /// * `PasswordError` - Hashing operation failed
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        self.password_hasher.hash(password)
    }

    /// Check a password against a stored digest.
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        self.password_hasher.verify(password, stored_hash)
    }

    /// Mint an access token and open a refresh session for `user_id`.
    ///
    /// # Errors
    /// * `JwtError` - Token signing failed
    /// * `SessionError` - Refresh token generation failed
    pub fn issue_pair(&self, claims: &Claims, user_id: U) -> Result<TokenPair, AuthenticationError> {
        let access_token = self.jwt_handler.issue(claims, self.access_token_ttl)?;
        let refresh_token = self.sessions.create(user_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_token_ttl_secs(),
        })
    }

    /// Mint the pair that replaces a consumed refresh session.
    ///
    /// # Errors
    /// * `SessionError::Revoked` - The owner's sessions were revoked since `previous` was opened
    /// * `JwtError` - Token signing failed
    pub fn rotate_pair(
        &self,
        claims: &Claims,
        previous: &Session<U>,
    ) -> Result<TokenPair, AuthenticationError> {
        let access_token = self.jwt_handler.issue(claims, self.access_token_ttl)?;
        let refresh_token = self.sessions.renew(previous)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_token_ttl_secs(),
        })
    }

    /// Validate and decode an access token.
    ///
    /// # Errors
    /// * `JwtError` - Token is malformed, tampered with or expired
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        self.jwt_handler.verify(token)
    }

    /// Look up a live refresh session without consuming it.
    pub fn session(&self, refresh_token: &str) -> Option<Session<U>> {
        self.sessions.get(refresh_token)
    }

    /// Consume a refresh token. At most one caller per token gets the session.
    pub fn consume_refresh_token(&self, refresh_token: &str) -> Option<Session<U>> {
        self.sessions.consume(refresh_token)
    }

    /// Return a consumed session whose rotation was abandoned. False if it
    /// was revoked or expired in the meantime.
    pub fn restore_session(&self, session: Session<U>) -> bool {
        self.sessions.restore(session)
    }

    /// Revoke a single refresh token.
    pub fn revoke(&self, refresh_token: &str) -> bool {
        self.sessions.delete(refresh_token)
    }

    /// Revoke every refresh token of `user_id`.
    pub fn revoke_all(&self, user_id: &U) -> usize {
        self.sessions.delete_all(user_id)
    }

    /// Remove expired sessions, returning the removed refresh tokens.
    pub fn sweep_expired_sessions(&self) -> Vec<String> {
        self.sessions.sweep_expired()
    }

    /// Number of stored sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Apply `policy` to `key`.
    pub fn check_rate_limit(&self, key: &str, policy: &RateLimitPolicy) -> RateDecision {
        self.rate_limiter.check_policy(key, policy)
    }

    /// Drop idle rate limit buckets.
    pub fn prune_rate_limits(&self, max_window_secs: u64) -> usize {
        self.rate_limiter.prune_idle(max_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes!";

    fn authenticator() -> (Authenticator<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let settings = AuthenticatorSettings {
            password_hasher: PasswordHasher::with_params(1024, 1, 1).unwrap(),
            ..AuthenticatorSettings::default()
        };
        let authenticator = Authenticator::with_settings(SECRET, settings, clock.clone())
            .expect("valid settings");
        (authenticator, clock)
    }

    #[test]
    fn test_issue_pair_after_password_check() {
        let (authenticator, _clock) = authenticator();

        let hash = authenticator
            .hash_password("my_password")
            .expect("Failed to hash password");
        assert!(authenticator.verify_password("my_password", &hash));
        assert!(!authenticator.verify_password("wrong_password", &hash));

        let claims = Claims::new("user123", "a@x.com", "user");
        let pair = authenticator
            .issue_pair(&claims, "user123".to_string())
            .expect("Failed to issue pair");

        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_eq!(pair.expires_in, 3600);

        let decoded = authenticator
            .validate_token(&pair.access_token)
            .expect("Token validation failed");
        assert_eq!(decoded.sub, "user123");

        let session = authenticator.session(&pair.refresh_token).unwrap();
        assert_eq!(session.user_id, "user123");
    }

    #[test]
    fn test_rotate_pair_refused_after_revoke_all() {
        let (authenticator, _clock) = authenticator();
        let claims = Claims::new("user123", "a@x.com", "user");

        let pair = authenticator.issue_pair(&claims, "user123".into()).unwrap();
        let previous = authenticator
            .consume_refresh_token(&pair.refresh_token)
            .unwrap();
        let rotated = authenticator.rotate_pair(&claims, &previous).unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let previous = authenticator
            .consume_refresh_token(&rotated.refresh_token)
            .unwrap();
        authenticator.revoke_all(&"user123".to_string());

        assert!(matches!(
            authenticator.rotate_pair(&claims, &previous),
            Err(AuthenticationError::SessionError(SessionError::Revoked))
        ));
        assert!(!authenticator.restore_session(previous));
        assert_eq!(authenticator.session_count(), 0);
    }

    #[test]
    fn test_access_token_expires_after_ttl() {
        let (authenticator, clock) = authenticator();
        let pair = authenticator
            .issue_pair(&Claims::new("user123", "a@x.com", "user"), "user123".into())
            .unwrap();

        clock.advance(Duration::seconds(3601));

        assert_eq!(
            authenticator.validate_token(&pair.access_token),
            Err(JwtError::Expired)
        );
    }

    #[test]
    fn test_refresh_token_single_use() {
        let (authenticator, _clock) = authenticator();
        let pair = authenticator
            .issue_pair(&Claims::new("user123", "a@x.com", "user"), "user123".into())
            .unwrap();

        assert!(authenticator.consume_refresh_token(&pair.refresh_token).is_some());
        assert!(authenticator.consume_refresh_token(&pair.refresh_token).is_none());
    }

    #[test]
    fn test_revoke_all() {
        let (authenticator, _clock) = authenticator();
        let claims = Claims::new("user123", "a@x.com", "user");
        let first = authenticator.issue_pair(&claims, "user123".into()).unwrap();
        let second = authenticator.issue_pair(&claims, "user123".into()).unwrap();

        assert_eq!(authenticator.revoke_all(&"user123".to_string()), 2);
        assert!(authenticator.consume_refresh_token(&first.refresh_token).is_none());
        assert!(authenticator.consume_refresh_token(&second.refresh_token).is_none());
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        let settings = AuthenticatorSettings {
            algorithm: Algorithm::ES256,
            ..AuthenticatorSettings::default()
        };

        let result =
            Authenticator::<String>::with_settings(SECRET, settings, Arc::new(SystemClock));
        assert!(matches!(
            result,
            Err(AuthenticationError::JwtError(JwtError::UnsupportedAlgorithm(_)))
        ));
    }
}
