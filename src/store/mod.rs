//! # Rule Store
//!
//! The in-memory, atomically refreshable view of the rule graph.
//!
//! The control plane owns the durable records; this store consumes them
//! through the [`SnapshotLoader`] interface and publishes immutable
//! [`RuleSnapshot`]s by pointer swap. A request takes one snapshot
//! reference up front and reads only from it, so a concurrent refresh can
//! never be observed half-applied. A failed load leaves the previous
//! snapshot in force.

mod error;
mod loader;
mod rule_store;
mod snapshot;

pub use error::{StoreError, StoreResult};
pub use loader::{RuleSubgraph, SnapshotData, SnapshotLoader, StaticLoader};
pub use rule_store::RuleStore;
pub use snapshot::{CompiledBlacklistEntry, RuleSnapshot};
