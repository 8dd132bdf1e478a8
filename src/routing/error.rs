//! Error types for route indexing.

use thiserror::Error;

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while compiling or storing routes.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The path pattern could not be compiled.
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The route record failed validation.
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}
