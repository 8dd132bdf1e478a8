//! The route index: `(method, path)` to route resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::error::{RoutingError, RoutingResult};
use super::pattern::PathPattern;
use crate::model::{RecordId, Route};

/// A route with its path pattern compiled for matching.
#[derive(Debug)]
pub struct CompiledRoute {
    route: Route,
    pattern: PathPattern,
}

impl CompiledRoute {
    /// The underlying route record.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The route id.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.route.id
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    /// All routes by id.
    by_id: HashMap<RecordId, Arc<CompiledRoute>>,

    /// Exact lookup: method -> literal path -> route id.
    literal: HashMap<String, HashMap<String, RecordId>>,

    /// Parameterised routes in ascending-id order for the fallback scan.
    parameterised: Vec<Arc<CompiledRoute>>,
}

impl IndexInner {
    fn insert(&mut self, compiled: Arc<CompiledRoute>) {
        // Overwriting by (method, path_pattern) replaces the previous owner
        // of that key even when ids differ.
        let method_map = self.literal.entry(compiled.route.method.clone()).or_default();
        if let Some(&prior_id) = method_map.get(&compiled.route.path_pattern) {
            if prior_id != compiled.id() {
                self.by_id.remove(&prior_id);
                self.parameterised.retain(|r| r.id() != prior_id);
            }
        }

        let method_map = self.literal.entry(compiled.route.method.clone()).or_default();
        method_map.insert(compiled.route.path_pattern.clone(), compiled.id());

        if let Some(prior) = self.by_id.insert(compiled.id(), Arc::clone(&compiled)) {
            // Same id re-stored under a different key: drop the stale key.
            if prior.route.method != compiled.route.method
                || prior.route.path_pattern != compiled.route.path_pattern
            {
                if let Some(map) = self.literal.get_mut(&prior.route.method) {
                    map.remove(&prior.route.path_pattern);
                }
            }
            self.parameterised.retain(|r| r.id() != compiled.id());
        }

        if compiled.pattern.is_parameterised() {
            let pos = self
                .parameterised
                .binary_search_by_key(&compiled.id(), |r| r.id())
                .unwrap_or_else(|pos| pos);
            self.parameterised.insert(pos, compiled);
        }
    }
}

/// In-memory index of discovered routes.
///
/// Routes are read-mostly: the discovery process batch-loads them at startup
/// and after discovery runs; every request performs a lookup. Patterns are
/// compiled on insert so lookups allocate nothing.
#[derive(Debug, Default)]
pub struct RouteIndex {
    inner: RwLock<IndexInner>,
}

impl RouteIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a route, keyed both by id and by
    /// `(method, path_pattern)`.
    pub fn store(&self, route: Route) -> RoutingResult<()> {
        let compiled = Self::compile(route)?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(compiled);
        Ok(())
    }

    /// Atomically replace the whole index with a new route set.
    ///
    /// The replacement is built off-lock; readers see either the old or
    /// the new route set, never an empty intermediate. Routes that fail to
    /// compile are skipped and logged.
    pub fn replace_all<I>(&self, routes: I)
    where
        I: IntoIterator<Item = Route>,
    {
        let mut next = IndexInner::default();
        for route in routes {
            let route_id = route.id;
            match Self::compile(route) {
                Ok(compiled) => next.insert(compiled),
                Err(e) => warn!(route_id, error = %e, "skipping unloadable route"),
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = next;
    }

    fn compile(route: Route) -> RoutingResult<Arc<CompiledRoute>> {
        route.validate().map_err(RoutingError::InvalidRoute)?;
        let pattern = PathPattern::compile(&route.path_pattern)?;
        Ok(Arc::new(CompiledRoute { route, pattern }))
    }

    /// Resolve a request `(method, path)` to a route.
    ///
    /// Exact `(method, path)` equality wins; otherwise parameterised
    /// patterns are scanned in ascending-id order and the first match is
    /// returned.
    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Option<Arc<CompiledRoute>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = inner.literal.get(method).and_then(|m| m.get(path)) {
            return inner.by_id.get(id).cloned();
        }

        for candidate in &inner.parameterised {
            if candidate.route.method == method && candidate.pattern.matches(path) {
                debug!(
                    route_id = candidate.id(),
                    pattern = %candidate.route.path_pattern,
                    %path,
                    "parameterised route matched"
                );
                return Some(Arc::clone(candidate));
            }
        }

        None
    }

    /// Remove all routes.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = IndexInner::default();
    }

    /// Snapshot of all stored routes.
    #[must_use]
    pub fn list(&self) -> Vec<Route> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut routes: Vec<Route> = inner.by_id.values().map(|r| r.route.clone()).collect();
        routes.sort_by_key(|r| r.id);
        routes
    }

    /// Number of stored routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
