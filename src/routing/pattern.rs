//! Path pattern compilation.
//!
//! Patterns are compiled to anchored regexes when a route is stored, so the
//! per-request match is a single regex test with no allocation.

use regex::Regex;

use super::error::{RoutingError, RoutingResult};

/// A compiled route path pattern.
///
/// Each `:name` placeholder matches exactly one non-`/` segment; literal
/// segments are escaped and matched verbatim.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// Original pattern text.
    raw: String,

    /// Anchored regex; absent for purely literal patterns, which are
    /// matched by string equality in the index.
    regex: Option<Regex>,

    /// Number of `:name` placeholders.
    param_count: usize,
}

impl PathPattern {
    /// Compile a path pattern.
    pub fn compile(pattern: &str) -> RoutingResult<Self> {
        let mut param_count = 0;
        let mut needs_regex = false;
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');

        for (i, segment) in pattern.split('/').enumerate() {
            if i > 0 {
                source.push('/');
            }
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(RoutingError::InvalidRoute(format!(
                        "empty parameter name in pattern '{pattern}'"
                    )));
                }
                param_count += 1;
                needs_regex = true;
                source.push_str("[^/]+");
            } else {
                source.push_str(&regex::escape(segment));
            }
        }
        source.push('$');

        let regex = if needs_regex {
            Some(
                Regex::new(&source).map_err(|source| RoutingError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            raw: pattern.to_string(),
            regex,
            param_count,
        })
    }

    /// The original pattern text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains `:name` placeholders.
    #[must_use]
    pub fn is_parameterised(&self) -> bool {
        self.param_count > 0
    }

    /// Number of `:name` placeholders.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Test a request path against the pattern.
    #[inline]
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(path),
            None => self.raw == path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::compile("/api/users").unwrap();
        assert!(!pattern.is_parameterised());
        assert!(pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/posts"));
        assert!(!pattern.matches("/api/users/42"));
    }

    #[test]
    fn test_param_pattern() {
        let pattern = PathPattern::compile("/api/users/:id").unwrap();
        assert!(pattern.is_parameterised());
        assert_eq!(pattern.param_count(), 1);
        assert!(pattern.matches("/api/users/42"));
        assert!(pattern.matches("/api/users/abc"));
        assert!(!pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/users/42/posts"));
    }

    #[test]
    fn test_multi_param_pattern() {
        let pattern = PathPattern::compile("/api/users/:user_id/posts/:id").unwrap();
        assert_eq!(pattern.param_count(), 2);
        assert!(pattern.matches("/api/users/7/posts/99"));
        assert!(!pattern.matches("/api/users/7/posts"));
    }

    #[test]
    fn test_param_does_not_span_segments() {
        let pattern = PathPattern::compile("/files/:name").unwrap();
        assert!(!pattern.matches("/files/a/b"));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        // Regex metacharacters in a literal segment must not be interpreted.
        let pattern = PathPattern::compile("/api/v1.0/:id").unwrap();
        assert!(pattern.matches("/api/v1.0/7"));
        assert!(!pattern.matches("/api/v1x0/7"));
    }

    #[test]
    fn test_empty_param_name_rejected() {
        assert!(PathPattern::compile("/api/:/x").is_err());
    }
}
