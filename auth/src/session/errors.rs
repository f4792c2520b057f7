use thiserror::Error;

/// Error type for session registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Secure randomness unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Sessions were revoked during rotation")]
    Revoked,
}
