use serde::Deserialize;

/// Quota applied by a named limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum number of requests allowed in the window
    pub max_requests: u32,
    /// Window size in seconds
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Registration: 10 requests per 60 seconds.
    pub const fn register() -> Self {
        Self::new(10, 60)
    }

    /// Login: 20 requests per 60 seconds.
    pub const fn login() -> Self {
        Self::new(20, 60)
    }

    /// Administrative user listing: 50 requests per 60 seconds.
    pub const fn admin_listing() -> Self {
        Self::new(50, 60)
    }
}
