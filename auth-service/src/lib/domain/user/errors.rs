use thiserror::Error;

/// Error for UserId parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserIdError {
    #[error("Invalid UUID format: {0}")]
    InvalidFormat(String),
}

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error for DisplayName validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Name must not be empty")]
    Empty,

    #[error("Name too long: maximum {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },
}

/// Error for plaintext password policy failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("Password must not be empty")]
    Empty,

    #[error("Password too long: maximum {max} characters, got {actual}")]
    TooLong { max: usize, actual: usize },
}

/// Malformed input rejected before any work is done.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid user ID: {0}")]
    UserId(#[from] UserIdError),

    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("Invalid name: {0}")]
    Name(#[from] NameError),

    #[error("Invalid password: {0}")]
    Password(#[from] PasswordPolicyError),

    #[error("Unknown role: {0}")]
    Role(String),

    #[error("Unknown logout scope: {0}")]
    Scope(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Authentication and authorization failures.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,
}

/// Uniqueness violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Email already registered: {0}")]
    EmailTaken(String),
}

/// Quota exhausted for a named limiter. Always recoverable by waiting.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Rate limit exceeded, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

/// Top-level error for all auth service operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    // Infrastructure errors
    #[error("Storage error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserIdError> for ServiceError {
    fn from(err: UserIdError) -> Self {
        ServiceError::Validation(err.into())
    }
}

impl From<EmailError> for ServiceError {
    fn from(err: EmailError) -> Self {
        ServiceError::Validation(err.into())
    }
}

impl From<auth::AuthenticationError> for ServiceError {
    fn from(err: auth::AuthenticationError) -> Self {
        match err {
            auth::AuthenticationError::SessionError(auth::SessionError::Revoked) => {
                ServiceError::Auth(AuthError::InvalidToken)
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}
