use std::collections::VecDeque;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use dashmap::DashMap;

use super::policy::RateLimitPolicy;
use crate::clock::Clock;

/// Upper bound on configurable windows (one year).
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

fn window(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted; `remaining` more fit in the current window.
    Allow { remaining: u32 },
    /// Request rejected; retry after `retry_after_secs` seconds.
    Deny { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

/// Sliding window rate limiter keyed by arbitrary strings.
///
/// Each key owns an ordered list of the instants of its admitted requests.
/// Only admitted requests are recorded: a denied request leaves the bucket
/// untouched, so a burst of rejections never extends the lockout once the
/// window rolls forward.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Prune, check and record for `key` as one atomic step.
    ///
    /// The bucket's shard stays write-locked for the whole sequence, so
    /// concurrent checks on the same key neither lose nor double count.
    pub fn check(&self, key: &str, max_requests: u32, window_secs: u64) -> RateDecision {
        let now = self.clock.now();
        let window = window(window_secs);
        let cutoff = now - window;

        let mut bucket = self.buckets.entry(key.to_string()).or_default();

        while bucket.front().is_some_and(|ts| *ts <= cutoff) {
            bucket.pop_front();
        }

        let current = u32::try_from(bucket.len()).unwrap_or(u32::MAX);
        if current < max_requests {
            bucket.push_back(now);
            return RateDecision::Allow {
                remaining: max_requests - current - 1,
            };
        }

        let retry_after_secs = bucket
            .front()
            .map(|oldest| {
                let wait = (*oldest + window) - now;
                let millis = wait.num_milliseconds().max(0);
                u64::try_from((millis + 999) / 1000).unwrap_or(0).max(1)
            })
            .unwrap_or(window_secs.max(1));

        tracing::debug!(key, retry_after_secs, "Rate limit exceeded");

        RateDecision::Deny { retry_after_secs }
    }

    /// Check `key` against a named policy.
    pub fn check_policy(&self, key: &str, policy: &RateLimitPolicy) -> RateDecision {
        self.check(key, policy.max_requests, policy.window_secs)
    }

    /// Drop buckets with no entry younger than `max_window_secs`.
    ///
    /// Returns the number of buckets removed.
    pub fn prune_idle(&self, max_window_secs: u64) -> usize {
        let cutoff = self.clock.now() - window(max_window_secs);
        let before = self.buckets.len();

        self.buckets
            .retain(|_, bucket| bucket.back().is_some_and(|newest| *newest > cutoff));

        before.saturating_sub(self.buckets.len())
    }
}
