//! # Route Index
//!
//! Maps `(method, path)` to a discovered route, with support for exact and
//! parameterised (`/users/:id`) patterns.
//!
//! Patterns are compiled to anchored regexes on insert; lookups first try an
//! exact `(method, path)` hit and then scan parameterised patterns in
//! ascending-id order, so matching a request never compiles or allocates.

mod error;
mod index;
mod pattern;

pub use error::{RoutingError, RoutingResult};
pub use index::{CompiledRoute, RouteIndex};
pub use pattern::PathPattern;
