use async_trait::async_trait;
use auth::Claims;
use auth::TokenPair;

use crate::domain::user::models::AuthResult;
use crate::domain::user::models::AuthenticatedUser;
use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::Limiter;
use crate::domain::user::models::LogoutScope;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::RegisterUserCommand;
use crate::domain::user::models::Role;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::UserUpdate;
use crate::user::errors::AuthError;
use crate::user::errors::RateLimitExceeded;
use crate::user::errors::ServiceError;

/// Port for auth domain service operations, consumed by the route layer.
#[async_trait]
pub trait AuthServicePort: Send + Sync + 'static {
    /// Hash a plaintext password off the async executor.
    ///
    /// # Errors
    /// * `Internal` - Hashing failed
    async fn hash_password(&self, password: &str) -> Result<String, ServiceError>;

    /// Create a user from an already hashed password and open a session.
    ///
    /// # Returns
    /// Token pair and the created user
    ///
    /// # Errors
    /// * `EmailTaken` - Email is already registered
    /// * `Store` - Credential store failed
    async fn register(&self, command: RegisterUserCommand) -> Result<AuthResult, ServiceError>;

    /// Verify credentials, record the login and open a session.
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown email or wrong password (indistinguishable)
    /// * `Store` - Credential store failed
    async fn login(&self, email: &EmailAddress, password: &str)
        -> Result<AuthResult, ServiceError>;

    /// Rotate a refresh token: consume it and mint a new pair.
    ///
    /// # Errors
    /// * `InvalidToken` - Token unknown, already used, revoked or expired, or
    ///   the user's sessions were revoked while the rotation was in flight
    /// * `Store` - Credential store failed; the refresh token stays usable
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResult, ServiceError>;

    /// Revoke one session (`Single`, requires the refresh token) or all of
    /// the user's sessions (`All`).
    ///
    /// # Returns
    /// Number of sessions revoked
    ///
    /// # Errors
    /// * `MissingField` - `Single` scope without a refresh token
    async fn logout(
        &self,
        user_id: &UserId,
        scope: LogoutScope,
        refresh_token: Option<&str>,
    ) -> Result<usize, ServiceError>;

    /// Mint an access token and refresh session for `user`.
    ///
    /// # Errors
    /// * `Internal` - Signing or token generation failed
    fn issue_pair(&self, user: &User) -> Result<TokenPair, ServiceError>;

    /// Verify an access token and return its claims.
    ///
    /// # Errors
    /// * `Expired` - Token lifetime elapsed
    /// * `InvalidToken` - Malformed or tampered token
    fn verify_token(&self, token: &str) -> Result<Claims, AuthError>;

    /// Resolve the caller behind an access token.
    ///
    /// # Errors
    /// * `Unauthenticated` - Any failure: bad token, expired, or unknown user
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;

    /// Check that an authenticated user holds `required`.
    ///
    /// # Errors
    /// * `Forbidden` - Role does not satisfy the requirement
    fn authorize(&self, user: &AuthenticatedUser, required: Role) -> Result<(), AuthError>;

    /// Apply the named limiter to `subject`.
    ///
    /// # Errors
    /// * `RateLimitExceeded` - Quota used up; carries the wait time
    fn enforce_rate_limit(&self, limiter: Limiter, subject: &str)
        -> Result<(), RateLimitExceeded>;

    /// List every user (administrative).
    ///
    /// # Errors
    /// * `Store` - Credential store failed
    async fn list_users(&self) -> Result<Vec<User>, ServiceError>;

    /// Change a user's role (administrative).
    ///
    /// # Errors
    /// * `UserNotFound` - No such user
    async fn update_role(&self, user_id: &UserId, role: Role) -> Result<User, ServiceError>;

    /// Drop expired sessions and idle rate limit buckets.
    ///
    /// # Returns
    /// Refresh tokens of the removed sessions
    fn sweep_expired_sessions(&self) -> Vec<String>;
}

/// Credential lookup capability backing authentication.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Retrieve user by email address.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `Store` - Storage operation failed
    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, ServiceError>;

    /// Retrieve user by identifier.
    ///
    /// # Returns
    /// Optional user entity (None if not found)
    ///
    /// # Errors
    /// * `Store` - Storage operation failed
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, ServiceError>;

    /// Persist a new user, assigning its id and creation time.
    ///
    /// # Errors
    /// * `EmailTaken` - Email is already registered
    /// * `Store` - Storage operation failed
    async fn create(&self, fields: NewUser) -> Result<User, ServiceError>;

    /// Apply a partial update.
    ///
    /// # Errors
    /// * `UserNotFound` - User does not exist
    /// * `Store` - Storage operation failed
    async fn update(&self, id: &UserId, fields: UserUpdate) -> Result<User, ServiceError>;
}

/// Read-only listing used by administrative routes.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Retrieve all users, oldest first.
    ///
    /// # Errors
    /// * `Store` - Storage operation failed
    async fn list_users(&self) -> Result<Vec<User>, ServiceError>;
}
