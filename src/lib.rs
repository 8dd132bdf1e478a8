//! # routeguard
//!
//! Route-scoped access-control middleware for HTTP services.
//!
//! routeguard sits at the front of a request pipeline and decides, per
//! request, whether to forward it or reject it with a policy response. It
//! combines four enforcement mechanisms behind a fast route lookup:
//!
//! - **IP filtering**: per-rule whitelists and blacklists with CIDR support
//! - **Rate limiting**: gradual-refill token buckets per `(ip, rule)`
//! - **Concurrent caps**: in-flight request limits with RAII release
//! - **Time restrictions**: day-of-week and time-of-day windows
//!
//! ## Architecture
//!
//! The control plane owns rules in durable storage and feeds the core
//! through a [`store::SnapshotLoader`]. The core publishes immutable rule
//! snapshots by pointer swap, so enforcement reads are consistent and
//! lock-light while refreshes stay atomic. The per-request hot path is
//! synchronous in-memory work; background sweepers reclaim idle limiter
//! state.
//!
//! ## Usage
//!
//! ```ignore
//! use routeguard::pipeline::{Enforcer, RequestInfo, Verdict};
//!
//! let enforcer = Enforcer::new();
//! enforcer.reload(&loader)?;
//!
//! let request = RequestInfo::new("GET", "/api/users/42")
//!     .with_header("X-Forwarded-For", "203.0.113.9")
//!     .with_peer_addr(peer);
//!
//! match enforcer.evaluate(&request) {
//!     Verdict::Allowed { guards } => {
//!         // forward; keep `guards` alive until the response completes
//!     },
//!     Verdict::Blocked(response) => {
//!         // respond with response.status / response.body
//!     },
//! }
//! ```

pub mod concurrency;
pub mod ipfilter;
pub mod model;
pub mod pipeline;
pub mod rate_limit;
pub mod routing;
pub mod schedule;
pub mod store;
