//! IPv4 and CIDR parsing and matching.
//!
//! Specs are parsed once when a snapshot is built; the hot path only
//! compares pre-computed `u32` values. Parsing is a byte scan with no heap
//! allocation.

use super::error::{FilterError, FilterResult};

/// Compute the network mask for a prefix length. `/0` -> `0`, `/32` -> `0xFFFF_FFFF`.
#[inline(always)]
pub(crate) const fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len)
    }
}

/// Parse an IPv4 address string to its `u32` value. Zero allocation.
pub fn parse_ipv4(ip: &str) -> FilterResult<u32> {
    let bytes = ip.as_bytes();
    let mut result = 0u32;
    let mut octet: u32 = 0;
    let mut dots = 0u8;
    let mut digit_count = 0u8;

    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                digit_count += 1;
                if digit_count > 3 {
                    return Err(FilterError::InvalidIpAddress(format!(
                        "octet too long in '{ip}'"
                    )));
                }
                octet = octet * 10 + u32::from(b - b'0');
                if octet > 255 {
                    return Err(FilterError::InvalidIpAddress(format!("octet > 255 in '{ip}'")));
                }
            },
            b'.' => {
                if digit_count == 0 {
                    return Err(FilterError::InvalidIpAddress(format!("empty octet in '{ip}'")));
                }
                result = (result << 8) | octet;
                octet = 0;
                dots += 1;
                digit_count = 0;
                if dots > 3 {
                    return Err(FilterError::InvalidIpAddress(format!(
                        "too many octets in '{ip}'"
                    )));
                }
            },
            _ => {
                return Err(FilterError::InvalidIpAddress(format!(
                    "invalid character in '{ip}'"
                )));
            },
        }
    }

    if dots != 3 || digit_count == 0 {
        return Err(FilterError::InvalidIpAddress(format!(
            "expected 4 octets in '{ip}'"
        )));
    }
    Ok((result << 8) | octet)
}

/// A pre-parsed IP specification, ready for hot-path matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPattern {
    /// Literal entry without a `/`. Matches numerically when both sides are
    /// IPv4, otherwise by textual equality (which is what admits IPv6
    /// literals in v1).
    Literal {
        /// The spec text as configured.
        text: String,
        /// Numeric value when the text is valid IPv4.
        addr: Option<u32>,
    },

    /// Valid IPv4 CIDR block. Never matches a non-IPv4 client address.
    Cidr {
        /// Network value, already masked.
        network: u32,
        /// High-bit mask for the prefix length.
        mask: u32,
    },
}

impl IpPattern {
    /// Parse an IP specification.
    ///
    /// Literal entries (no `/`) always parse; CIDR entries fail on a bad
    /// address or an out-of-range prefix length.
    pub fn parse(spec: &str) -> FilterResult<Self> {
        match spec.split_once('/') {
            Some((ip, prefix)) => {
                let prefix_len: u8 = prefix.parse().map_err(|_| {
                    FilterError::InvalidCidr(format!("invalid prefix length in '{spec}'"))
                })?;
                if prefix_len > 32 {
                    return Err(FilterError::InvalidCidr(format!(
                        "prefix length must be 0-32, got {prefix_len}"
                    )));
                }
                let mask = prefix_mask(prefix_len);
                let network = parse_ipv4(ip)? & mask;
                Ok(Self::Cidr { network, mask })
            },
            None => Ok(Self::Literal {
                text: spec.to_string(),
                addr: parse_ipv4(spec).ok(),
            }),
        }
    }

    /// Check whether a client address matches this pattern.
    ///
    /// `client_v4` is the pre-parsed numeric value of `client` when the
    /// client address is IPv4; the caller parses once per evaluation.
    #[inline]
    #[must_use]
    pub fn matches(&self, client: &str, client_v4: Option<u32>) -> bool {
        match self {
            Self::Literal { text, addr } => match (addr, client_v4) {
                (Some(a), Some(b)) => a == &b,
                _ => text == client,
            },
            Self::Cidr { network, mask } => match client_v4 {
                Some(ip) => ip & mask == *network,
                None => false,
            },
        }
    }
}
