//! Block responses: default mapping and custom-response rendering.

use http::StatusCode;
use tracing::warn;

use crate::model::{CustomResponse, RecordId, ResponseFormat};

/// Why a request was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// A rate limit's bucket was empty.
    RateLimitExceeded,

    /// A blacklist entry (global or per-rule) matched.
    IpBlacklisted,

    /// Whitelists exist on the rule and none matched.
    IpNotWhitelisted,

    /// No time restriction permitted the current instant.
    TimeRestricted,

    /// The in-flight cap was reached.
    ConcurrentLimitExceeded,
}

impl BlockReason {
    /// Default HTTP status for the reason.
    #[must_use]
    pub fn default_status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded | Self::ConcurrentLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            },
            Self::IpBlacklisted | Self::IpNotWhitelisted | Self::TimeRestricted => {
                StatusCode::FORBIDDEN
            },
        }
    }

    /// Default human-readable message for the reason.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::IpBlacklisted => "IP address is blacklisted",
            Self::IpNotWhitelisted => "IP address is not whitelisted",
            Self::TimeRestricted => "Access restricted at this time",
            Self::ConcurrentLimitExceeded => "Too many concurrent requests",
        }
    }

    /// Stable identifier for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::IpBlacklisted => "ip_blacklisted",
            Self::IpNotWhitelisted => "ip_not_whitelisted",
            Self::TimeRestricted => "time_restricted",
            Self::ConcurrentLimitExceeded => "concurrent_limit_exceeded",
        }
    }
}

/// The HTTP response a blocked request receives.
#[derive(Debug, Clone)]
pub struct BlockResponse {
    /// Response status.
    pub status: StatusCode,

    /// `Content-Type` header value.
    pub content_type: &'static str,

    /// Response body.
    pub body: String,

    /// Why the request was blocked.
    pub reason: BlockReason,

    /// The rule that blocked, absent for global-blacklist hits.
    pub rule_id: Option<RecordId>,
}

impl BlockResponse {
    /// Build the default response for a reason: JSON body, default status.
    #[must_use]
    pub fn default_for(reason: BlockReason, rule_id: Option<RecordId>) -> Self {
        Self {
            status: reason.default_status(),
            content_type: "application/json",
            body: serde_json::json!({ "error": reason.default_message() }).to_string(),
            reason,
            rule_id,
        }
    }

    /// Build a response from an operator-configured [`CustomResponse`].
    ///
    /// An out-of-range status code in the record falls back to the
    /// reason's default status rather than failing the request.
    #[must_use]
    pub fn custom(custom: &CustomResponse, reason: BlockReason, rule_id: RecordId) -> Self {
        let status = StatusCode::from_u16(custom.status).unwrap_or_else(|_| {
            warn!(
                response_id = custom.id,
                status = custom.status,
                "invalid custom response status; using default"
            );
            reason.default_status()
        });

        let message = custom
            .message
            .as_deref()
            .unwrap_or_else(|| reason.default_message());

        let body = match custom.content_type {
            ResponseFormat::Json => render_json(message),
            ResponseFormat::Html => render_html(message),
            ResponseFormat::Plain => message.to_string(),
            ResponseFormat::Xml => render_xml(message),
        };

        Self {
            status,
            content_type: custom.content_type.mime(),
            body,
            reason,
            rule_id: Some(rule_id),
        }
    }
}

/// A message that is already valid JSON is emitted as-is; anything else is
/// wrapped as `{"error": ...}`.
fn render_json(message: &str) -> String {
    if serde_json::from_str::<serde_json::Value>(message).is_ok() {
        message.to_string()
    } else {
        serde_json::json!({ "error": message }).to_string()
    }
}

fn render_html(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Access Denied</title></head>\
         <body><p>{}</p></body></html>",
        escape_markup(message)
    )
}

fn render_xml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><error>{}</error>",
        escape_markup(message)
    )
}

fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let resp = BlockResponse::default_for(BlockReason::RateLimitExceeded, Some(1));
        assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.body, r#"{"error":"Rate limit exceeded"}"#);
        assert_eq!(resp.content_type, "application/json");

        let resp = BlockResponse::default_for(BlockReason::IpBlacklisted, None);
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
        assert_eq!(resp.body, r#"{"error":"IP address is blacklisted"}"#);
        assert!(resp.rule_id.is_none());

        let resp = BlockResponse::default_for(BlockReason::TimeRestricted, Some(2));
        assert_eq!(resp.body, r#"{"error":"Access restricted at this time"}"#);

        let resp = BlockResponse::default_for(BlockReason::ConcurrentLimitExceeded, Some(2));
        assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.body, r#"{"error":"Too many concurrent requests"}"#);
    }

    #[test]
    fn test_custom_plain() {
        let custom = CustomResponse::new(1, 9, 418, ResponseFormat::Plain).with_message("no");
        let resp = BlockResponse::custom(&custom, BlockReason::IpBlacklisted, 9);

        assert_eq!(resp.status.as_u16(), 418);
        assert_eq!(resp.body, "no");
        assert_eq!(resp.content_type, "text/plain");
        assert_eq!(resp.rule_id, Some(9));
    }

    #[test]
    fn test_custom_json_wraps_non_json() {
        let custom =
            CustomResponse::new(1, 9, 429, ResponseFormat::Json).with_message("slow down");
        let resp = BlockResponse::custom(&custom, BlockReason::RateLimitExceeded, 9);
        assert_eq!(resp.body, r#"{"error":"slow down"}"#);
    }

    #[test]
    fn test_custom_json_passes_valid_json() {
        let custom = CustomResponse::new(1, 9, 429, ResponseFormat::Json)
            .with_message(r#"{"code":42,"detail":"later"}"#);
        let resp = BlockResponse::custom(&custom, BlockReason::RateLimitExceeded, 9);
        assert_eq!(resp.body, r#"{"code":42,"detail":"later"}"#);
    }

    #[test]
    fn test_custom_html_escapes() {
        let custom =
            CustomResponse::new(1, 9, 403, ResponseFormat::Html).with_message("<script>x</script>");
        let resp = BlockResponse::custom(&custom, BlockReason::IpBlacklisted, 9);
        assert!(resp.body.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(resp.body.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_custom_xml() {
        let custom =
            CustomResponse::new(1, 9, 403, ResponseFormat::Xml).with_message("a & b");
        let resp = BlockResponse::custom(&custom, BlockReason::TimeRestricted, 9);
        assert_eq!(
            resp.body,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><error>a &amp; b</error>"
        );
    }

    #[test]
    fn test_custom_absent_message_uses_reason_default() {
        let custom = CustomResponse::new(1, 9, 403, ResponseFormat::Plain);
        let resp = BlockResponse::custom(&custom, BlockReason::IpNotWhitelisted, 9);
        assert_eq!(resp.body, "IP address is not whitelisted");
    }

    #[test]
    fn test_custom_invalid_status_falls_back() {
        let custom = CustomResponse::new(1, 9, 99, ResponseFormat::Plain).with_message("x");
        let resp = BlockResponse::custom(&custom, BlockReason::IpBlacklisted, 9);
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
    }
}
