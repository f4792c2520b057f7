pub mod limiter;
pub mod policy;

pub use limiter::RateDecision;
pub use limiter::RateLimiter;
pub use policy::RateLimitPolicy;
