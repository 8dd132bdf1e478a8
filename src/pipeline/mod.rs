//! # Enforcement Pipeline
//!
//! The per-request orchestrator.
//!
//! For each request the [`Enforcer`] resolves the client IP, checks the
//! global blacklist, looks up the route, and walks the route's rules in
//! priority order through the four evaluators: IP filter, time window,
//! rate limit, concurrent limit. The first failing check produces a
//! [`BlockResponse`] (the rule's custom response when configured, the
//! default reason mapping otherwise); requests matching no route pass
//! through untouched.
//!
//! An allowed verdict carries the request's [`ConnectionGuard`]s; the
//! embedding server holds them until the response completes so concurrency
//! slots are released even when a request is abandoned mid-flight.
//!
//! [`ConnectionGuard`]: crate::concurrency::ConnectionGuard

mod config;
mod context;
mod engine;
mod response;

pub use config::EnforcementConfig;
pub use context::RequestInfo;
pub use engine::{Enforcer, EnforcerStats, MaintenanceTasks, Verdict};
pub use response::{BlockReason, BlockResponse};
