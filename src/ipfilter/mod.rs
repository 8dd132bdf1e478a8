//! # IP Filtering
//!
//! Whitelist/blacklist evaluation with CIDR support.
//!
//! Specs are parsed once when a rule snapshot is built ([`CompiledFilter`]);
//! per-request work is a numeric compare against pre-computed values. A spec
//! that does not parse compiles to an entry that matches nothing, so
//! malformed operator data can only ever widen access, never break requests.
//!
//! Evaluation semantics:
//!
//! - An empty filter set allows.
//! - Any matching **blacklist** entry rejects, regardless of whitelists.
//! - When at least one whitelist exists, the address must match one.

mod cidr;
mod error;
mod evaluator;

pub use cidr::{parse_ipv4, IpPattern};
pub use error::{FilterError, FilterResult};
pub use evaluator::{evaluate, CompiledFilter, FilterVerdict};
