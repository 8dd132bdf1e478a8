//! # Rate Limiting
//!
//! Gradual-refill token buckets keyed by `(ip, rule_id)`.
//!
//! Each admitted request consumes one token; tokens accrue at
//! `capacity / window` per second and a full idle window restores the
//! bucket to capacity. This is a token bucket, not a fixed-window counter:
//! after exhausting `N` tokens, a client regains exactly `N` admissions
//! over the following window rather than a burst at a window boundary.
//!
//! The bucket map is read-locked on the fast path with per-bucket mutexes
//! for the consume, so distinct keys never contend. Idle buckets are
//! reclaimed by [`RateLimiter::cleanup`], typically driven from the
//! [`spawn_sweeper`] interval task.

mod bucket;
mod limiter;

pub use bucket::{Bucket, Consume};
pub use limiter::{spawn_sweeper, BucketKey, RateDecision, RateLimiter};
