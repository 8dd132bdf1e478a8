//! Keyed rate limiter over per-`(ip, rule)` token buckets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::debug;

use super::bucket::{Bucket, Consume};
use crate::model::{RateLimit, RecordId};

/// Key for one bucket: client IP plus rule id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Client IP in its textual form.
    pub ip: String,

    /// Rule the limit belongs to.
    pub rule_id: RecordId,
}

impl BucketKey {
    /// Build a key.
    #[must_use]
    pub fn new(ip: impl Into<String>, rule_id: RecordId) -> Self {
        Self {
            ip: ip.into(),
            rule_id,
        }
    }
}

/// Decision from a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request consumed a token.
    Allowed {
        /// Tokens left in the bucket.
        remaining: u32,
    },

    /// The bucket is empty.
    Exceeded {
        /// Seconds until a token accrues (for a `Retry-After` header).
        retry_after: u64,
    },
}

impl RateDecision {
    /// Whether the request was admitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Token-bucket rate limiter keyed by `(ip, rule_id)`.
///
/// The bucket map takes a read lock on the fast path and a short write lock
/// only to insert a new key; each bucket's read-modify-write happens under
/// its own mutex, so updates to distinct keys never serialize.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<BucketKey, Arc<Mutex<Bucket>>>>,

    total_checks: AtomicU64,
    total_allowed: AtomicU64,
    total_denied: AtomicU64,
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one request against a rule's rate limit at `now` (epoch
    /// seconds), creating the key's bucket on first use.
    ///
    /// A key's first request creates its bucket one token short of capacity
    /// and is admitted without touching the consume path.
    pub fn check(
        &self,
        ip: &str,
        rule_id: RecordId,
        config: &RateLimit,
        now: u64,
    ) -> RateDecision {
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        let key = BucketKey::new(ip, rule_id);
        let decision = match self.existing(&key) {
            Some(entry) => consume_from(&entry, config, now),
            None => self.admit_first(key, config, now),
        };

        match decision {
            RateDecision::Allowed { .. } => {
                self.total_allowed.fetch_add(1, Ordering::Relaxed);
            },
            RateDecision::Exceeded { .. } => {
                self.total_denied.fetch_add(1, Ordering::Relaxed);
            },
        }
        decision
    }

    fn existing(&self, key: &BucketKey) -> Option<Arc<Mutex<Bucket>>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(key).cloned()
    }

    /// Insert the key's first bucket under the write lock, re-checking for
    /// a racing insert.
    fn admit_first(&self, key: BucketKey, config: &RateLimit, now: u64) -> RateDecision {
        let entry = {
            let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
            match buckets.entry(key) {
                std::collections::hash_map::Entry::Occupied(occupied) => {
                    Arc::clone(occupied.get())
                },
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    let bucket = Bucket::first(config, now);
                    let remaining = bucket.tokens;
                    vacant.insert(Arc::new(Mutex::new(bucket)));
                    return RateDecision::Allowed { remaining };
                },
            }
        };
        // Lost the insert race; consume from the winner's bucket off-lock.
        consume_from(&entry, config, now)
    }

    /// Remove buckets idle longer than `window_seconds * ttl_factor`.
    ///
    /// Each bucket's mutex is held only for the idle test, so a sweep never
    /// blocks checks on other keys for long.
    pub fn cleanup(&self, now: u64, ttl_factor: u32) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, entry| {
            let bucket = entry.lock().unwrap_or_else(|e| e.into_inner());
            let ttl = u64::from(bucket.window_seconds) * u64::from(ttl_factor.max(1));
            bucket.last_refill.saturating_add(ttl) > now
        });
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, remaining = buckets.len(), "rate bucket sweep");
        }
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Total checks performed.
    #[must_use]
    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Total requests admitted.
    #[must_use]
    pub fn total_allowed(&self) -> u64 {
        self.total_allowed.load(Ordering::Relaxed)
    }

    /// Total requests rejected.
    #[must_use]
    pub fn total_denied(&self) -> u64 {
        self.total_denied.load(Ordering::Relaxed)
    }
}

fn consume_from(entry: &Arc<Mutex<Bucket>>, config: &RateLimit, now: u64) -> RateDecision {
    let mut bucket = entry.lock().unwrap_or_else(|e| e.into_inner());
    match bucket.consume(config, now) {
        Consume::Allowed { remaining } => RateDecision::Allowed { remaining },
        Consume::Exhausted { retry_after } => RateDecision::Exceeded { retry_after },
    }
}

/// Run a periodic bucket sweep on the current tokio runtime.
///
/// Abort the returned handle to stop the sweep.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    every: Duration,
    ttl_factor: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            limiter.cleanup(now, ttl_factor);
        }
    })
}
