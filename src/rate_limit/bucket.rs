//! Token bucket state and refill arithmetic.

use crate::model::RateLimit;

/// State of one `(ip, rule)` token bucket.
///
/// Tokens are whole integers and time is whole seconds; refill is gradual:
/// `elapsed * capacity / window` tokens accrue within a window, and a full
/// window elapsing restores the bucket to capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Tokens currently available.
    pub tokens: u32,

    /// Epoch seconds of the last successful consume.
    pub last_refill: u64,

    /// Window length captured from the config at the last write.
    pub window_seconds: u32,
}

/// Outcome of a bucket consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    /// A token was consumed.
    Allowed {
        /// Tokens left after the consume.
        remaining: u32,
    },

    /// The bucket is empty.
    Exhausted {
        /// Seconds until at least one token accrues.
        retry_after: u64,
    },
}

impl Bucket {
    /// Create a bucket for a key's first request. The request itself
    /// consumes one token, so the bucket starts one short of capacity.
    #[must_use]
    pub fn first(config: &RateLimit, now: u64) -> Self {
        Self {
            tokens: config.requests_per_window.saturating_sub(1),
            last_refill: now,
            window_seconds: config.window_seconds,
        }
    }

    /// Refill by elapsed time, then try to consume one token.
    ///
    /// On success the state is written back with `last_refill = now`; on
    /// exhaustion the state is untouched so partial credit keeps accruing
    /// against the original timestamp.
    pub fn consume(&mut self, config: &RateLimit, now: u64) -> Consume {
        let capacity = config.requests_per_window;
        let window = u64::from(self.window_seconds.max(1));
        let elapsed = now.saturating_sub(self.last_refill);

        let refilled = if elapsed >= window {
            capacity
        } else {
            let accrued = elapsed * u64::from(capacity) / window;
            self.tokens
                .saturating_add(accrued.min(u64::from(capacity)) as u32)
                .min(capacity)
        };

        if refilled >= 1 {
            self.tokens = refilled - 1;
            self.last_refill = now;
            self.window_seconds = config.window_seconds;
            Consume::Allowed {
                remaining: self.tokens,
            }
        } else {
            let per_token = window.div_ceil(u64::from(capacity));
            Consume::Exhausted {
                retry_after: per_token.saturating_sub(elapsed).max(1),
            }
        }
    }
}
