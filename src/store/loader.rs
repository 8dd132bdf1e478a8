//! The loader interface between durable storage and the in-memory store.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::model::{
    BlacklistEntry, ConcurrentLimit, CustomResponse, IpFilter, RateLimit, RecordId, Route, Rule,
    TimeRestriction,
};
use super::error::StoreResult;

/// A full batch of control-plane records, as loaded from durable storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Discovered routes.
    #[serde(default)]
    pub routes: Vec<Route>,

    /// Protection rules.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// IP filter entries.
    #[serde(default)]
    pub ip_filters: Vec<IpFilter>,

    /// Rate-limit configs.
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,

    /// Concurrent-limit configs.
    #[serde(default)]
    pub concurrent_limits: Vec<ConcurrentLimit>,

    /// Time restrictions.
    #[serde(default)]
    pub time_restrictions: Vec<TimeRestriction>,

    /// Custom block responses.
    #[serde(default)]
    pub custom_responses: Vec<CustomResponse>,

    /// Global blacklist entries.
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
}

/// The records belonging to a single rule, for selective refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSubgraph {
    /// The rule itself; `None` means the rule no longer exists.
    #[serde(default)]
    pub rule: Option<Rule>,

    /// The rule's IP filter entries.
    #[serde(default)]
    pub ip_filters: Vec<IpFilter>,

    /// The rule's rate-limit configs.
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,

    /// The rule's concurrent-limit configs.
    #[serde(default)]
    pub concurrent_limits: Vec<ConcurrentLimit>,

    /// The rule's time restrictions.
    #[serde(default)]
    pub time_restrictions: Vec<TimeRestriction>,

    /// The rule's custom responses.
    #[serde(default)]
    pub custom_responses: Vec<CustomResponse>,
}

/// Produces rule-graph snapshots on demand.
///
/// Implementations wrap whatever durable storage the embedding application
/// uses. Errors propagate to the refresh caller; they never affect the
/// currently published snapshot.
pub trait SnapshotLoader: Send + Sync {
    /// Load the complete rule graph.
    fn load_snapshot(&self) -> StoreResult<SnapshotData>;

    /// Load a single rule's records.
    fn load_rule(&self, rule_id: RecordId) -> StoreResult<RuleSubgraph>;
}

/// An in-memory loader.
///
/// Serves embedded deployments that assemble their rule graph in code, and
/// tests. `set_data` replaces the batch served by subsequent loads.
#[derive(Debug, Default)]
pub struct StaticLoader {
    data: RwLock<SnapshotData>,
}

impl StaticLoader {
    /// Create a loader serving the given batch.
    #[must_use]
    pub fn new(data: SnapshotData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Replace the batch served by subsequent loads.
    pub fn set_data(&self, data: SnapshotData) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = data;
    }
}

impl SnapshotLoader for StaticLoader {
    fn load_snapshot(&self) -> StoreResult<SnapshotData> {
        Ok(self.data.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn load_rule(&self, rule_id: RecordId) -> StoreResult<RuleSubgraph> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(RuleSubgraph {
            rule: data.rules.iter().find(|r| r.id == rule_id).cloned(),
            ip_filters: data
                .ip_filters
                .iter()
                .filter(|f| f.rule_id == rule_id)
                .cloned()
                .collect(),
            rate_limits: data
                .rate_limits
                .iter()
                .filter(|r| r.rule_id == rule_id)
                .cloned()
                .collect(),
            concurrent_limits: data
                .concurrent_limits
                .iter()
                .filter(|c| c.rule_id == rule_id)
                .cloned()
                .collect(),
            time_restrictions: data
                .time_restrictions
                .iter()
                .filter(|t| t.rule_id == rule_id)
                .cloned()
                .collect(),
            custom_responses: data
                .custom_responses
                .iter()
                .filter(|c| c.rule_id == rule_id)
                .cloned()
                .collect(),
        })
    }
}
