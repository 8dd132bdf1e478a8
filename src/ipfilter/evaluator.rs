//! Whitelist/blacklist evaluation against a rule's filter set.

use tracing::warn;

use super::cidr::{parse_ipv4, IpPattern};
use crate::model::{FilterKind, IpFilter, RecordId};

/// Outcome of evaluating a rule's IP filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// The address passed the filter set.
    Allowed,

    /// A blacklist entry matched.
    Blacklisted,

    /// Whitelists exist on the rule and none matched.
    NotWhitelisted,
}

/// A filter entry with its spec pre-parsed for hot-path matching.
///
/// Filters whose spec fails to parse compile to a `pattern` of `None` and
/// match nothing; malformed operator data must never reject a request.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    /// Source filter id.
    pub id: RecordId,

    /// Whitelist or blacklist.
    pub kind: FilterKind,

    /// Parsed spec, absent when the spec text is malformed.
    pub pattern: Option<IpPattern>,
}

impl CompiledFilter {
    /// Compile a filter record, logging and neutralising malformed specs.
    #[must_use]
    pub fn compile(filter: &IpFilter) -> Self {
        let pattern = match IpPattern::parse(&filter.ip_spec) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(
                    filter_id = filter.id,
                    rule_id = filter.rule_id,
                    spec = %filter.ip_spec,
                    error = %e,
                    "ignoring unparseable IP filter spec"
                );
                None
            },
        };
        Self {
            id: filter.id,
            kind: filter.kind,
            pattern,
        }
    }

    #[inline]
    fn matches(&self, client: &str, client_v4: Option<u32>) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|p| p.matches(client, client_v4))
    }
}

/// Evaluate a client address against a rule's compiled filter set.
///
/// An empty set allows. Blacklist entries take precedence. When at least
/// one whitelist exists the address must match one of them.
#[must_use]
pub fn evaluate(filters: &[CompiledFilter], client: &str) -> FilterVerdict {
    if filters.is_empty() {
        return FilterVerdict::Allowed;
    }

    let client_v4 = parse_ipv4(client).ok();

    for filter in filters {
        if filter.kind == FilterKind::Blacklist && filter.matches(client, client_v4) {
            return FilterVerdict::Blacklisted;
        }
    }

    let mut saw_whitelist = false;
    for filter in filters {
        if filter.kind == FilterKind::Whitelist {
            saw_whitelist = true;
            if filter.matches(client, client_v4) {
                return FilterVerdict::Allowed;
            }
        }
    }

    if saw_whitelist {
        FilterVerdict::NotWhitelisted
    } else {
        FilterVerdict::Allowed
    }
}
