//! Control-plane data model.
//!
//! These records are owned by durable storage; the loader hands the core
//! copies of them and the core publishes those copies inside an immutable
//! [`RuleSnapshot`](crate::store::RuleSnapshot). Nothing in the enforcement
//! path ever mutates a record.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier type for all control-plane records.
pub type RecordId = i64;

fn default_enabled() -> bool {
    true
}

/// A discovered HTTP route.
///
/// `(method, path_pattern)` is unique across routes. Path patterns contain
/// literal segments and `:name` placeholders (`/api/users/:id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Stable route id.
    pub id: RecordId,

    /// Uppercase HTTP method.
    pub method: String,

    /// Path pattern with optional `:name` placeholders.
    pub path_pattern: String,

    /// Controller tag from route discovery.
    #[serde(default)]
    pub controller: Option<String>,

    /// Action tag from route discovery.
    #[serde(default)]
    pub action: Option<String>,

    /// Route helper name from route discovery.
    #[serde(default)]
    pub helper: Option<String>,
}

impl Route {
    /// Create a route, normalising the method to uppercase.
    #[must_use]
    pub fn new(id: RecordId, method: impl Into<String>, path_pattern: impl Into<String>) -> Self {
        Self {
            id,
            method: method.into().to_ascii_uppercase(),
            path_pattern: path_pattern.into(),
            controller: None,
            action: None,
            helper: None,
        }
    }

    /// Attach a controller tag.
    #[must_use]
    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    /// Attach an action tag.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<(), String> {
        if self.method.is_empty() {
            return Err("route method must not be empty".to_string());
        }
        if !self.path_pattern.starts_with('/') {
            return Err(format!(
                "route path pattern must start with '/', got '{}'",
                self.path_pattern
            ));
        }
        Ok(())
    }
}

/// The unit of protection attached to a route.
///
/// All four enforcement mechanisms (IP filters, rate limit, time
/// restrictions, concurrent limit) hang off a rule. Disabled rules are
/// observationally absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable rule id.
    pub id: RecordId,

    /// Owning route id.
    pub route_id: RecordId,

    /// Whether the rule participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Evaluation priority; higher runs first.
    #[serde(default)]
    pub priority: i32,

    /// Operator-facing description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Rule {
    /// Create an enabled rule.
    #[must_use]
    pub fn new(id: RecordId, route_id: RecordId, priority: i32) -> Self {
        Self {
            id,
            route_id,
            enabled: true,
            priority,
            description: None,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Whitelist or blacklist membership for an [`IpFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Matching IPs are admitted; non-matching IPs are rejected once any
    /// whitelist exists on the rule.
    Whitelist,

    /// Matching IPs are rejected. Takes precedence over whitelists.
    Blacklist,
}

/// A single IP filter entry on a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpFilter {
    /// Stable filter id.
    pub id: RecordId,

    /// Owning rule id.
    pub rule_id: RecordId,

    /// Literal IPv4 address or CIDR block (`a.b.c.d/n`, `0 <= n <= 32`).
    pub ip_spec: String,

    /// Whitelist or blacklist.
    pub kind: FilterKind,

    /// Whether the filter participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl IpFilter {
    /// Create an enabled filter entry.
    #[must_use]
    pub fn new(
        id: RecordId,
        rule_id: RecordId,
        ip_spec: impl Into<String>,
        kind: FilterKind,
    ) -> Self {
        Self {
            id,
            rule_id,
            ip_spec: ip_spec.into(),
            kind,
            enabled: true,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Token-bucket rate limit attached to a rule.
///
/// At most one enabled config per rule is honoured; the snapshot builder
/// resolves duplicates deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Stable config id.
    pub id: RecordId,

    /// Owning rule id.
    pub rule_id: RecordId,

    /// Bucket capacity: admitted requests per full window.
    pub requests_per_window: u32,

    /// Refill window length in seconds.
    pub window_seconds: u32,

    /// Whether the config participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RateLimit {
    /// Create an enabled rate-limit config.
    #[must_use]
    pub fn new(id: RecordId, rule_id: RecordId, requests_per_window: u32, window_seconds: u32) -> Self {
        Self {
            id,
            rule_id,
            requests_per_window,
            window_seconds,
            enabled: true,
        }
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<(), String> {
        if self.requests_per_window == 0 {
            return Err("requests_per_window must be > 0".to_string());
        }
        if self.window_seconds == 0 {
            return Err("window_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// In-flight request cap attached to a rule. At most one per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrentLimit {
    /// Stable config id.
    pub id: RecordId,

    /// Owning rule id.
    pub rule_id: RecordId,

    /// Maximum simultaneous in-flight requests per client IP.
    pub max_concurrent: u32,

    /// Whether the config participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ConcurrentLimit {
    /// Create an enabled concurrent-limit config.
    #[must_use]
    pub fn new(id: RecordId, rule_id: RecordId, max_concurrent: u32) -> Self {
        Self {
            id,
            rule_id,
            max_concurrent,
            enabled: true,
        }
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be > 0".to_string());
        }
        Ok(())
    }
}

/// Day-of-week / time-of-day access window on a rule.
///
/// Multiple restrictions on one rule combine disjunctively: the rule admits
/// a request when *any* enabled entry permits the current instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRestriction {
    /// Stable restriction id.
    pub id: RecordId,

    /// Owning rule id.
    pub rule_id: RecordId,

    /// Window start (time of day, second granularity).
    #[serde(default)]
    pub start_time: Option<NaiveTime>,

    /// Window end (time of day, second granularity). A start later than the
    /// end denotes a window that wraps midnight.
    #[serde(default)]
    pub end_time: Option<NaiveTime>,

    /// Permitted ISO weekdays, 1 = Monday .. 7 = Sunday.
    #[serde(default)]
    pub days_of_week: Option<Vec<u8>>,

    /// Carried for forward compatibility; evaluation is UTC.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Whether the restriction participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TimeRestriction {
    /// Create an enabled restriction with no bounds (fully permissive).
    #[must_use]
    pub fn new(id: RecordId, rule_id: RecordId) -> Self {
        Self {
            id,
            rule_id,
            start_time: None,
            end_time: None,
            days_of_week: None,
            timezone: None,
            enabled: true,
        }
    }

    /// Set the time-of-day window.
    #[must_use]
    pub fn with_window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set the permitted weekdays.
    #[must_use]
    pub fn with_days(mut self, days: Vec<u8>) -> Self {
        self.days_of_week = Some(days);
        self
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref days) = self.days_of_week {
            if days.is_empty() {
                return Err("days_of_week must be non-empty when present".to_string());
            }
            for &day in days {
                if !(1..=7).contains(&day) {
                    return Err(format!("day_of_week out of range 1-7: {day}"));
                }
            }
        }
        Ok(())
    }
}

/// Body format of a [`CustomResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// `application/json`.
    #[serde(rename = "application/json")]
    Json,

    /// `text/html`.
    #[serde(rename = "text/html")]
    Html,

    /// `text/plain`.
    #[serde(rename = "text/plain")]
    Plain,

    /// `application/xml`.
    #[serde(rename = "application/xml")]
    Xml,
}

impl ResponseFormat {
    /// The MIME type string for the `Content-Type` header.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::Plain => "text/plain",
            Self::Xml => "application/xml",
        }
    }
}

/// Operator-configured block response for a rule. At most one per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomResponse {
    /// Stable response id.
    pub id: RecordId,

    /// Owning rule id.
    pub rule_id: RecordId,

    /// HTTP status code to return.
    pub status: u16,

    /// Response message; when absent the default message for the block
    /// reason is used.
    #[serde(default)]
    pub message: Option<String>,

    /// Body format.
    pub content_type: ResponseFormat,

    /// Whether the response participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl CustomResponse {
    /// Create an enabled custom response.
    #[must_use]
    pub fn new(id: RecordId, rule_id: RecordId, status: u16, content_type: ResponseFormat) -> Self {
        Self {
            id,
            rule_id,
            status,
            message: None,
            content_type,
            enabled: true,
        }
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Process-wide IP blacklist entry, evaluated before any per-route logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Stable entry id.
    pub id: RecordId,

    /// Literal IPv4 address or CIDR block.
    pub ip_spec: String,

    /// Entry stops matching once expired.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether the entry participates in enforcement.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl BlacklistEntry {
    /// Create an enabled, non-expiring entry.
    #[must_use]
    pub fn new(id: RecordId, ip_spec: impl Into<String>) -> Self {
        Self {
            id,
            ip_spec: ip_spec.into(),
            expires_at: None,
            enabled: true,
        }
    }

    /// Set the expiry timestamp.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the entry is enabled and not expired at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}
