//! Error types for IP filtering.

use thiserror::Error;

/// Result type for IP filtering operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// Errors raised while parsing operator-supplied IP specifications.
///
/// These never surface to a request: a filter whose spec fails to parse is
/// compiled into an entry that matches nothing.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Malformed IPv4 address text.
    #[error("invalid IPv4 address: {0}")]
    InvalidIpAddress(String),

    /// Malformed CIDR block text.
    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),
}
