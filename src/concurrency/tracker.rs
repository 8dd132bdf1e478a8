//! In-flight request tracking with atomic acquire/release.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::model::RecordId;

/// Key for one in-flight counter: client IP plus rule id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// Client IP in its textual form.
    pub ip: String,

    /// Rule the limit belongs to.
    pub rule_id: RecordId,
}

impl SlotKey {
    /// Build a key.
    #[must_use]
    pub fn new(ip: impl Into<String>, rule_id: RecordId) -> Self {
        Self {
            ip: ip.into(),
            rule_id,
        }
    }
}

#[derive(Debug)]
struct Slot {
    active: AtomicU32,
    /// Epoch seconds of the last acquire or release, for idle reclamation.
    last_touched: AtomicU64,
}

impl Slot {
    fn touch(&self, now: u64) {
        self.last_touched.store(now, Ordering::Relaxed);
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug)]
pub enum AcquireOutcome {
    /// A slot was taken; dropping the guard releases it.
    Acquired(ConnectionGuard),

    /// The key is already at its cap.
    Exceeded,
}

impl AcquireOutcome {
    /// Whether a slot was taken.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// RAII handle for one in-flight request.
///
/// The slot is released exactly once, on drop, so abandonment anywhere in
/// the request's lifetime (completion, error return, panic unwind) releases
/// it and a duplicate release cannot happen.
#[derive(Debug)]
pub struct ConnectionGuard {
    slot: Arc<Slot>,
}

impl ConnectionGuard {
    /// Release the slot now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.slot.active.fetch_sub(1, Ordering::AcqRel);
        self.slot
            .touch(chrono::Utc::now().timestamp().max(0) as u64);
    }
}

/// Tracks in-flight requests per `(ip, rule_id)` and enforces caps.
///
/// Check-and-increment is a single CAS loop on the key's counter, so two
/// racing requests can never both squeeze under the cap.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    slots: RwLock<HashMap<SlotKey, Arc<Slot>>>,

    total_acquired: AtomicU64,
    total_rejected: AtomicU64,
}

impl ConcurrencyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically take a slot for the key if the cap allows it.
    pub fn try_acquire(&self, ip: &str, rule_id: RecordId, max: u32) -> AcquireOutcome {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let slot = self.slot(ip, rule_id);

        let mut current = slot.active.load(Ordering::Acquire);
        loop {
            if current >= max {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return AcquireOutcome::Exceeded;
            }
            match slot.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        slot.touch(now);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        AcquireOutcome::Acquired(ConnectionGuard { slot })
    }

    /// Read-only cap test, without taking a slot.
    #[must_use]
    pub fn check(&self, ip: &str, rule_id: RecordId, max: u32) -> bool {
        self.active(ip, rule_id) < max
    }

    /// Current in-flight count for a key.
    #[must_use]
    pub fn active(&self, ip: &str, rule_id: RecordId) -> u32 {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&SlotKey::new(ip, rule_id))
            .map_or(0, |slot| slot.active.load(Ordering::Acquire))
    }

    fn slot(&self, ip: &str, rule_id: RecordId) -> Arc<Slot> {
        let key = SlotKey::new(ip, rule_id);
        {
            let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get(&key) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key).or_insert_with(|| {
            Arc::new(Slot {
                active: AtomicU32::new(0),
                last_touched: AtomicU64::new(0),
            })
        }))
    }

    /// Reclaim idle zero-count slots untouched for `idle_secs`.
    pub fn cleanup(&self, now: u64, idle_secs: u64) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|_, slot| {
            // Under the write lock no new guard can be handed out, so a
            // strong count of one means the map holds the only reference.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            if slot.active.load(Ordering::Acquire) > 0 {
                return true;
            }
            slot.last_touched.load(Ordering::Relaxed).saturating_add(idle_secs) > now
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!(removed, remaining = slots.len(), "idle slot sweep");
        }
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Total slots handed out.
    #[must_use]
    pub fn total_acquired(&self) -> u64 {
        self.total_acquired.load(Ordering::Relaxed)
    }

    /// Total acquires rejected at the cap.
    #[must_use]
    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Relaxed)
    }
}

/// Run a periodic idle-slot sweep on the current tokio runtime.
pub fn spawn_sweeper(
    tracker: Arc<ConcurrencyTracker>,
    every: Duration,
    idle_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            tracker.cleanup(now, idle_secs);
        }
    })
}
