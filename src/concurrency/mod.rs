//! # Concurrent Request Limiting
//!
//! Per-`(ip, rule_id)` in-flight counters with atomic check-and-acquire.
//!
//! [`ConcurrencyTracker::try_acquire`] hands out a [`ConnectionGuard`] whose
//! `Drop` releases the slot, so release is tied to response completion (or
//! any earlier abandonment) and can never happen twice. Idle zero-count
//! entries are reclaimed by [`ConcurrencyTracker::cleanup`].

mod tracker;

pub use tracker::{spawn_sweeper, AcquireOutcome, ConcurrencyTracker, ConnectionGuard, SlotKey};
