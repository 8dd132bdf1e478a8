//! The published rule store: versioned snapshot publication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::info;

use super::error::StoreResult;
use super::loader::SnapshotLoader;
use super::snapshot::RuleSnapshot;
use crate::model::RecordId;

/// Holds the currently published [`RuleSnapshot`] and applies refreshes.
///
/// Readers take one `Arc` per request and never block behind a refresh: the
/// replacement snapshot is built entirely off-lock and the write lock is
/// held only for the pointer swap. Writers serialize among themselves on a
/// separate mutex so two concurrent refreshes cannot interleave their
/// build-then-swap sequences.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSnapshot>>,
    writer: Mutex<()>,
    publishes: AtomicU64,
}

impl RuleStore {
    /// Create a store publishing an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSnapshot::default())),
            writer: Mutex::new(()),
            publishes: AtomicU64::new(0),
        }
    }

    /// The currently published snapshot.
    ///
    /// Take this once per request and read only from it; the reference
    /// stays internally consistent regardless of concurrent refreshes.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Atomically replace the entire rule graph from the loader.
    ///
    /// On loader failure the previously published snapshot remains in
    /// force and the error is returned to the caller.
    pub fn refresh_all(&self, loader: &dyn SnapshotLoader) -> StoreResult<()> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let data = loader.load_snapshot()?;
        let snapshot = Arc::new(RuleSnapshot::build(data));
        self.publish(snapshot);
        Ok(())
    }

    /// Atomically replace a single rule's sub-graph from the loader.
    pub fn refresh_rule(&self, rule_id: RecordId, loader: &dyn SnapshotLoader) -> StoreResult<()> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let subgraph = loader.load_rule(rule_id)?;
        let snapshot = Arc::new(self.snapshot().with_rule(rule_id, subgraph));
        self.publish(snapshot);
        Ok(())
    }

    fn publish(&self, snapshot: Arc<RuleSnapshot>) {
        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            *current = snapshot;
        }
        let version = self.publishes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(version, "rule snapshot published");
    }

    /// Number of snapshots published since startup.
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
