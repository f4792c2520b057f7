use serde::Deserialize;
use serde::Serialize;

/// Access token claims.
///
/// `iat` and `exp` are Unix timestamps stamped by the issuer; values set by
/// callers before issuance are overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,

    /// Email of the subject at issuance time
    pub email: String,

    /// Role of the subject at issuance time
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create claims for a subject. Timestamps are filled in at issuance.
    pub fn new(sub: impl ToString, email: impl ToString, role: impl ToString) -> Self {
        Self {
            sub: sub.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            iat: 0,
            exp: 0,
        }
    }

    /// Check if the token is expired at `current_timestamp`, tolerating
    /// `leeway` seconds of skew.
    pub fn is_expired(&self, current_timestamp: i64, leeway: i64) -> bool {
        current_timestamp > self.exp.saturating_add(leeway)
    }
}
