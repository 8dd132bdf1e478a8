//! Error types for the rule store.

use thiserror::Error;

/// Result type for rule-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced to the control plane by refresh operations.
///
/// A refresh error leaves the previously published snapshot in force;
/// enforcement is never degraded by a failed control-plane load.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The loader failed to produce a snapshot.
    #[error("loader error: {0}")]
    Loader(String),
}
