//! Immutable, indexed view of the rule graph.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::loader::{RuleSubgraph, SnapshotData};
use crate::ipfilter::{CompiledFilter, IpPattern};
use crate::model::{
    BlacklistEntry, ConcurrentLimit, CustomResponse, RateLimit, RecordId, Route, Rule,
    TimeRestriction,
};

/// A global blacklist entry with its spec pre-parsed.
#[derive(Debug, Clone)]
pub struct CompiledBlacklistEntry {
    /// Source entry id.
    pub id: RecordId,

    /// Parsed spec, absent when the spec text is malformed.
    pub pattern: Option<IpPattern>,

    /// Entry stops matching once expired.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CompiledBlacklistEntry {
    fn compile(entry: &BlacklistEntry) -> Self {
        let pattern = match IpPattern::parse(&entry.ip_spec) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(
                    entry_id = entry.id,
                    spec = %entry.ip_spec,
                    error = %e,
                    "ignoring unparseable global blacklist spec"
                );
                None
            },
        };
        Self {
            id: entry.id,
            pattern,
            expires_at: entry.expires_at,
        }
    }

    /// Whether the entry matches a client address at `now`.
    ///
    /// Expiry is evaluated per request: snapshots can outlive short-lived
    /// ban entries.
    #[must_use]
    pub fn matches(&self, client: &str, client_v4: Option<u32>, now: DateTime<Utc>) -> bool {
        if let Some(expiry) = self.expires_at {
            if expiry <= now {
                return false;
            }
        }
        self.pattern
            .as_ref()
            .is_some_and(|p| p.matches(client, client_v4))
    }
}

/// An immutable, internally consistent view of the entire rule graph.
///
/// Built off the hot path and published by pointer swap; a request takes
/// one `Arc` reference and reads only this struct, so it can never observe
/// a half-applied refresh. Only enabled records survive the build, which
/// makes a disabled rule observationally identical to a deleted one.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    routes: Vec<Route>,
    rules_by_route: HashMap<RecordId, Vec<Rule>>,
    ip_filters_by_rule: HashMap<RecordId, Vec<CompiledFilter>>,
    rate_limit_by_rule: HashMap<RecordId, RateLimit>,
    concurrent_limit_by_rule: HashMap<RecordId, ConcurrentLimit>,
    time_restrictions_by_rule: HashMap<RecordId, Vec<TimeRestriction>>,
    custom_response_by_rule: HashMap<RecordId, CustomResponse>,
    blacklist: Vec<CompiledBlacklistEntry>,
}

impl RuleSnapshot {
    /// Build an indexed snapshot from a loaded record batch.
    #[must_use]
    pub fn build(data: SnapshotData) -> Self {
        let mut snapshot = Self {
            routes: data.routes,
            ..Self::default()
        };

        let mut live_rules: HashSet<RecordId> = HashSet::new();
        for rule in data.rules.into_iter().filter(|r| r.enabled) {
            live_rules.insert(rule.id);
            snapshot
                .rules_by_route
                .entry(rule.route_id)
                .or_default()
                .push(rule);
        }
        for rules in snapshot.rules_by_route.values_mut() {
            sort_rules(rules);
        }

        for filter in data.ip_filters.iter().filter(|f| f.enabled) {
            if !live_rules.contains(&filter.rule_id) {
                continue;
            }
            snapshot
                .ip_filters_by_rule
                .entry(filter.rule_id)
                .or_default()
                .push(CompiledFilter::compile(filter));
        }

        for limit in data.rate_limits.into_iter().filter(|r| r.enabled) {
            if !live_rules.contains(&limit.rule_id) {
                continue;
            }
            insert_rate_limit(&mut snapshot.rate_limit_by_rule, limit);
        }

        for limit in data.concurrent_limits.into_iter().filter(|c| c.enabled) {
            if !live_rules.contains(&limit.rule_id) {
                continue;
            }
            insert_concurrent_limit(&mut snapshot.concurrent_limit_by_rule, limit);
        }

        for restriction in data.time_restrictions.into_iter().filter(|t| t.enabled) {
            if !live_rules.contains(&restriction.rule_id) {
                continue;
            }
            snapshot
                .time_restrictions_by_rule
                .entry(restriction.rule_id)
                .or_default()
                .push(restriction);
        }

        for response in data.custom_responses.into_iter().filter(|c| c.enabled) {
            if !live_rules.contains(&response.rule_id) {
                continue;
            }
            insert_custom_response(&mut snapshot.custom_response_by_rule, response);
        }

        snapshot.blacklist = data
            .blacklist
            .iter()
            .filter(|e| e.enabled)
            .map(CompiledBlacklistEntry::compile)
            .collect();

        snapshot
    }

    /// Produce a new snapshot with one rule's sub-graph replaced.
    ///
    /// A subgraph without a rule, or with a disabled one, removes the rule
    /// and all its records from the result.
    #[must_use]
    pub fn with_rule(&self, rule_id: RecordId, subgraph: RuleSubgraph) -> Self {
        let mut next = Self {
            routes: self.routes.clone(),
            rules_by_route: self.rules_by_route.clone(),
            ip_filters_by_rule: self.ip_filters_by_rule.clone(),
            rate_limit_by_rule: self.rate_limit_by_rule.clone(),
            concurrent_limit_by_rule: self.concurrent_limit_by_rule.clone(),
            time_restrictions_by_rule: self.time_restrictions_by_rule.clone(),
            custom_response_by_rule: self.custom_response_by_rule.clone(),
            blacklist: self.blacklist.clone(),
        };

        for rules in next.rules_by_route.values_mut() {
            rules.retain(|r| r.id != rule_id);
        }
        next.rules_by_route.retain(|_, rules| !rules.is_empty());
        next.ip_filters_by_rule.remove(&rule_id);
        next.rate_limit_by_rule.remove(&rule_id);
        next.concurrent_limit_by_rule.remove(&rule_id);
        next.time_restrictions_by_rule.remove(&rule_id);
        next.custom_response_by_rule.remove(&rule_id);

        let Some(rule) = subgraph.rule.filter(|r| r.enabled && r.id == rule_id) else {
            return next;
        };

        let route_rules = next.rules_by_route.entry(rule.route_id).or_default();
        route_rules.push(rule);
        sort_rules(route_rules);

        let filters: Vec<CompiledFilter> = subgraph
            .ip_filters
            .iter()
            .filter(|f| f.enabled && f.rule_id == rule_id)
            .map(CompiledFilter::compile)
            .collect();
        if !filters.is_empty() {
            next.ip_filters_by_rule.insert(rule_id, filters);
        }

        for limit in subgraph
            .rate_limits
            .into_iter()
            .filter(|r| r.enabled && r.rule_id == rule_id)
        {
            insert_rate_limit(&mut next.rate_limit_by_rule, limit);
        }

        for limit in subgraph
            .concurrent_limits
            .into_iter()
            .filter(|c| c.enabled && c.rule_id == rule_id)
        {
            insert_concurrent_limit(&mut next.concurrent_limit_by_rule, limit);
        }

        let restrictions: Vec<TimeRestriction> = subgraph
            .time_restrictions
            .into_iter()
            .filter(|t| t.enabled && t.rule_id == rule_id)
            .collect();
        if !restrictions.is_empty() {
            next.time_restrictions_by_rule.insert(rule_id, restrictions);
        }

        for response in subgraph
            .custom_responses
            .into_iter()
            .filter(|c| c.enabled && c.rule_id == rule_id)
        {
            insert_custom_response(&mut next.custom_response_by_rule, response);
        }

        next
    }

    /// Routes carried by the snapshot, for index synchronisation.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Enabled rules for a route, priority descending then id ascending.
    #[must_use]
    pub fn rules_for_route(&self, route_id: RecordId) -> &[Rule] {
        self.rules_by_route
            .get(&route_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Enabled IP filters for a rule.
    #[must_use]
    pub fn ip_filters(&self, rule_id: RecordId) -> &[CompiledFilter] {
        self.ip_filters_by_rule
            .get(&rule_id)
            .map_or(&[], Vec::as_slice)
    }

    /// The rule's active rate limit, if any.
    #[must_use]
    pub fn rate_limit(&self, rule_id: RecordId) -> Option<&RateLimit> {
        self.rate_limit_by_rule.get(&rule_id)
    }

    /// The rule's active concurrent limit, if any.
    #[must_use]
    pub fn concurrent_limit(&self, rule_id: RecordId) -> Option<&ConcurrentLimit> {
        self.concurrent_limit_by_rule.get(&rule_id)
    }

    /// Enabled time restrictions for a rule.
    #[must_use]
    pub fn time_restrictions(&self, rule_id: RecordId) -> &[TimeRestriction] {
        self.time_restrictions_by_rule
            .get(&rule_id)
            .map_or(&[], Vec::as_slice)
    }

    /// The rule's custom block response, if any.
    #[must_use]
    pub fn custom_response(&self, rule_id: RecordId) -> Option<&CustomResponse> {
        self.custom_response_by_rule.get(&rule_id)
    }

    /// Enabled global blacklist entries.
    #[must_use]
    pub fn blacklist(&self) -> &[CompiledBlacklistEntry] {
        &self.blacklist
    }
}

fn sort_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}

/// Keep the lowest-id enabled config when storage carries duplicates.
fn insert_rate_limit(map: &mut HashMap<RecordId, RateLimit>, limit: RateLimit) {
    if let Err(e) = limit.validate() {
        warn!(config_id = limit.id, rule_id = limit.rule_id, error = %e, "skipping invalid rate limit");
        return;
    }
    match map.get(&limit.rule_id) {
        Some(existing) if existing.id <= limit.id => {
            warn!(
                rule_id = limit.rule_id,
                kept = existing.id,
                dropped = limit.id,
                "multiple enabled rate limits on rule; keeping lowest id"
            );
        },
        _ => {
            map.insert(limit.rule_id, limit);
        },
    }
}

fn insert_concurrent_limit(map: &mut HashMap<RecordId, ConcurrentLimit>, limit: ConcurrentLimit) {
    if let Err(e) = limit.validate() {
        warn!(config_id = limit.id, rule_id = limit.rule_id, error = %e, "skipping invalid concurrent limit");
        return;
    }
    match map.get(&limit.rule_id) {
        Some(existing) if existing.id <= limit.id => {
            warn!(
                rule_id = limit.rule_id,
                kept = existing.id,
                dropped = limit.id,
                "multiple enabled concurrent limits on rule; keeping lowest id"
            );
        },
        _ => {
            map.insert(limit.rule_id, limit);
        },
    }
}

fn insert_custom_response(map: &mut HashMap<RecordId, CustomResponse>, response: CustomResponse) {
    match map.get(&response.rule_id) {
        Some(existing) if existing.id <= response.id => {
            warn!(
                rule_id = response.rule_id,
                kept = existing.id,
                dropped = response.id,
                "multiple enabled custom responses on rule; keeping lowest id"
            );
        },
        _ => {
            map.insert(response.rule_id, response);
        },
    }
}
