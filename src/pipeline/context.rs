//! Per-request input to the enforcement pipeline.

use std::collections::HashMap;

/// The slice of an inbound request the pipeline reads.
///
/// Header names are lowercased on insert so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    peer_addr: Option<String>,
}

impl RequestInfo {
    /// Create a request description, normalising the method to uppercase.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            headers: HashMap::new(),
            peer_addr: None,
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the transport peer address (`ip` or `ip:port`).
    #[must_use]
    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    /// The uppercase HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Resolve the client IP.
    ///
    /// Prefers the first comma-separated token of `X-Forwarded-For`, then
    /// `X-Real-IP`, then the transport peer address. Operators are expected
    /// to front the process with a trusted proxy; the chain itself is not
    /// validated here.
    #[must_use]
    pub fn client_ip(&self) -> &str {
        if let Some(forwarded) = self.headers.get("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first;
                }
            }
        }

        if let Some(real_ip) = self.headers.get("x-real-ip") {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return real_ip;
            }
        }

        self.peer_addr.as_deref().map_or("", strip_port)
    }
}

/// Strip a trailing `:port` from an `ip:port` peer address.
///
/// Only applies when the host part looks like dotted IPv4, so bare IPv6
/// literals pass through untouched.
fn strip_port(addr: &str) -> &str {
    match addr.rsplit_once(':') {
        Some((host, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && host.contains('.') =>
        {
            host
        },
        _ => addr,
    }
}
