//! The per-request enforcement engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::config::EnforcementConfig;
use super::context::RequestInfo;
use super::response::{BlockReason, BlockResponse};
use crate::concurrency::{self, AcquireOutcome, ConcurrencyTracker, ConnectionGuard};
use crate::ipfilter::{self, parse_ipv4, FilterVerdict};
use crate::model::RecordId;
use crate::rate_limit::{self, RateDecision, RateLimiter};
use crate::routing::RouteIndex;
use crate::schedule::{self, ScheduleVerdict};
use crate::store::{RuleSnapshot, RuleStore, SnapshotLoader, StoreResult};

/// Counters for enforcement outcomes.
#[derive(Debug, Default)]
pub struct EnforcerStats {
    /// Requests run through the pipeline.
    pub requests_checked: AtomicU64,

    /// Requests admitted.
    pub requests_allowed: AtomicU64,

    /// Requests blocked, any reason.
    pub requests_blocked: AtomicU64,

    /// Requests whose path matched no route.
    pub passthroughs: AtomicU64,

    /// Blocks due to IP filtering (blacklist or missing whitelist).
    pub ip_blocks: AtomicU64,

    /// Blocks due to time restrictions.
    pub time_blocks: AtomicU64,

    /// Blocks due to rate limits.
    pub rate_blocks: AtomicU64,

    /// Blocks due to concurrent-request caps.
    pub concurrency_blocks: AtomicU64,
}

impl EnforcerStats {
    fn record_block(&self, reason: BlockReason) {
        self.requests_blocked.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            BlockReason::IpBlacklisted | BlockReason::IpNotWhitelisted => &self.ip_blocks,
            BlockReason::TimeRestricted => &self.time_blocks,
            BlockReason::RateLimitExceeded => &self.rate_blocks,
            BlockReason::ConcurrentLimitExceeded => &self.concurrency_blocks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The pipeline's decision for one request.
#[derive(Debug)]
#[must_use]
pub enum Verdict {
    /// Forward the request.
    ///
    /// `guards` holds one slot per concurrent-limited rule the request
    /// passed; keep them alive until the response completes, since
    /// dropping them is what releases the slots.
    Allowed {
        /// Concurrency slots held by this request.
        guards: Vec<ConnectionGuard>,
    },

    /// Reject the request with the contained response.
    Blocked(BlockResponse),
}

impl Verdict {
    /// Whether the request was admitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Background maintenance tasks spawned by [`Enforcer::spawn_maintenance`].
///
/// Aborts the tasks on drop.
#[derive(Debug)]
pub struct MaintenanceTasks {
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl MaintenanceTasks {
    /// Stop the sweepers now.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for MaintenanceTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

/// The enforcement pipeline.
///
/// One instance is created at process start, before the server accepts
/// traffic, and shared across request tasks. Per request it runs: global
/// blacklist, route lookup, then each of the route's rules in priority
/// order through the IP filter, time window, rate limit, and concurrent
/// limit evaluators.
///
/// The pipeline fails open: malformed operator data neutralises the
/// affected record rather than blocking traffic, and a control-plane
/// refresh failure leaves the previous rule snapshot serving.
#[derive(Debug)]
pub struct Enforcer {
    config: EnforcementConfig,
    index: RouteIndex,
    store: RuleStore,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConcurrencyTracker>,
    stats: EnforcerStats,
}

impl Enforcer {
    /// Create an enforcer with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EnforcementConfig::default())
    }

    /// Create an enforcer with custom configuration.
    #[must_use]
    pub fn with_config(config: EnforcementConfig) -> Self {
        Self {
            config,
            index: RouteIndex::new(),
            store: RuleStore::new(),
            limiter: Arc::new(RateLimiter::new()),
            tracker: Arc::new(ConcurrencyTracker::new()),
            stats: EnforcerStats::default(),
        }
    }

    /// The route index, for discovery-time `store_route` calls.
    #[must_use]
    pub fn route_index(&self) -> &RouteIndex {
        &self.index
    }

    /// The rule store, for control-plane refresh calls.
    #[must_use]
    pub fn rule_store(&self) -> &RuleStore {
        &self.store
    }

    /// Enforcement counters.
    #[must_use]
    pub fn stats(&self) -> &EnforcerStats {
        &self.stats
    }

    /// Refresh the rule graph and resynchronise the route index from it.
    ///
    /// On loader failure nothing changes and the error is returned.
    pub fn reload(&self, loader: &dyn SnapshotLoader) -> StoreResult<()> {
        self.store.refresh_all(loader)?;

        let snapshot = self.store.snapshot();
        self.index.replace_all(snapshot.routes().iter().cloned());
        Ok(())
    }

    /// Refresh a single rule's sub-graph. Routes are untouched.
    pub fn reload_rule(&self, rule_id: RecordId, loader: &dyn SnapshotLoader) -> StoreResult<()> {
        self.store.refresh_rule(rule_id, loader)
    }

    /// Evaluate a request now.
    pub fn evaluate(&self, request: &RequestInfo) -> Verdict {
        self.evaluate_at(request, Utc::now())
    }

    /// Evaluate a request at an explicit instant. Deterministic; the
    /// variant tests and replay tooling use.
    pub fn evaluate_at(&self, request: &RequestInfo, now: DateTime<Utc>) -> Verdict {
        self.stats.requests_checked.fetch_add(1, Ordering::Relaxed);

        if !self.config.enabled {
            self.stats.requests_allowed.fetch_add(1, Ordering::Relaxed);
            return Verdict::Allowed { guards: Vec::new() };
        }

        // One snapshot reference for the whole request; concurrent
        // refreshes cannot be observed mid-evaluation.
        let snapshot = self.store.snapshot();
        let client = request.client_ip();
        let client_v4 = parse_ipv4(client).ok();

        for entry in snapshot.blacklist() {
            if entry.matches(client, client_v4, now) {
                debug!(%client, entry_id = entry.id, "global blacklist hit");
                self.stats.record_block(BlockReason::IpBlacklisted);
                return Verdict::Blocked(BlockResponse::default_for(
                    BlockReason::IpBlacklisted,
                    None,
                ));
            }
        }

        // Unknown paths pass through untouched; this middleware does not
        // authorise what it does not know.
        let Some(route) = self.index.lookup(request.method(), request.path()) else {
            self.stats.passthroughs.fetch_add(1, Ordering::Relaxed);
            self.stats.requests_allowed.fetch_add(1, Ordering::Relaxed);
            return Verdict::Allowed { guards: Vec::new() };
        };

        let now_secs = now.timestamp().max(0) as u64;
        let mut guards = Vec::new();

        for rule in snapshot.rules_for_route(route.id()) {
            match ipfilter::evaluate(snapshot.ip_filters(rule.id), client) {
                FilterVerdict::Allowed => {},
                FilterVerdict::Blacklisted => {
                    return self.block(&snapshot, rule.id, BlockReason::IpBlacklisted);
                },
                FilterVerdict::NotWhitelisted => {
                    return self.block(&snapshot, rule.id, BlockReason::IpNotWhitelisted);
                },
            }

            if schedule::evaluate(snapshot.time_restrictions(rule.id), now)
                == ScheduleVerdict::Restricted
            {
                return self.block(&snapshot, rule.id, BlockReason::TimeRestricted);
            }

            if let Some(limit) = snapshot.rate_limit(rule.id) {
                if let RateDecision::Exceeded { .. } =
                    self.limiter.check(client, rule.id, limit, now_secs)
                {
                    return self.block(&snapshot, rule.id, BlockReason::RateLimitExceeded);
                }
            }

            if let Some(limit) = snapshot.concurrent_limit(rule.id) {
                match self
                    .tracker
                    .try_acquire(client, rule.id, limit.max_concurrent)
                {
                    AcquireOutcome::Acquired(guard) => guards.push(guard),
                    AcquireOutcome::Exceeded => {
                        // Guards taken for earlier rules release on drop.
                        return self.block(&snapshot, rule.id, BlockReason::ConcurrentLimitExceeded);
                    },
                }
            }
        }

        self.stats.requests_allowed.fetch_add(1, Ordering::Relaxed);
        Verdict::Allowed { guards }
    }

    fn block(&self, snapshot: &RuleSnapshot, rule_id: RecordId, reason: BlockReason) -> Verdict {
        self.stats.record_block(reason);
        debug!(rule_id, reason = reason.as_str(), "request blocked");

        let response = match snapshot.custom_response(rule_id) {
            Some(custom) => BlockResponse::custom(custom, reason, rule_id),
            None => BlockResponse::default_for(reason, Some(rule_id)),
        };
        Verdict::Blocked(response)
    }

    /// Spawn the bucket and slot sweepers on the current tokio runtime.
    #[must_use]
    pub fn spawn_maintenance(&self) -> MaintenanceTasks {
        let every = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        MaintenanceTasks {
            handles: vec![
                rate_limit::spawn_sweeper(
                    Arc::clone(&self.limiter),
                    every,
                    self.config.bucket_ttl_factor,
                ),
                concurrency::spawn_sweeper(
                    Arc::clone(&self.tracker),
                    every,
                    self.config.slot_idle_secs,
                ),
            ],
        }
    }
}

impl Default for Enforcer {
    fn default() -> Self {
        Self::new()
    }
}
