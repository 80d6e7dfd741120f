//! Shared HTTP utilities for the storefront workspace.
//!
//! Provides the JSON error body shape, timestamp formatting, and the small
//! parsing helpers used by the API server and its configuration.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "validation" => "Invalid input",
        "unauthorized" => "Authentication required",
        "forbidden" => "Access denied",
        "conflict" => "Resource already exists",
        "out_of_stock" => "Not enough stock",
        "empty_cart" => "Cart is empty",
        "invalid_transition" => "Order status change not allowed",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Query / Config Parsing
// ============================================================================

/// Default page size when a list endpoint gets no `limit`.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    match limit {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(n) => n.min(MAX_PAGE_SIZE),
    }
}

/// Largest offset handed to a store; SQLite offsets are signed 64-bit.
pub const MAX_OFFSET: usize = i64::MAX as usize;

/// Default a missing offset to 0 and cap it at `MAX_OFFSET`.
pub fn clamp_offset(offset: Option<usize>) -> usize {
    offset.unwrap_or(0).min(MAX_OFFSET)
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `1`, `true`, `yes` and `on` (any case) are true.
pub fn is_truthy(s: &str) -> bool {
    ["1", "true", "yes", "on"]
        .iter()
        .any(|t| s.trim().eq_ignore_ascii_case(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_json_err() {
        let err = json_err("not_found");
        assert_eq!(err, serde_json::json!({"error": {"code": "not_found", "message": "Resource not found"}}));

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(err, serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}}));
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("out_of_stock", "only 2 left");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "out_of_stock", "message": "only 2 left"}})
        );
    }

    #[test]
    fn test_rfc3339_formatting() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(system_time_to_rfc3339(t), "2023-11-14T22:13:20Z");
        let sub_second = t + Duration::from_millis(750);
        assert_eq!(system_time_to_rfc3339(sub_second), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_limit(Some(5)), 5);
        assert_eq!(clamp_limit(Some(10_000)), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(40)), 40);
        assert_eq!(clamp_offset(Some(usize::MAX)), MAX_OFFSET);
    }

    #[test]
    fn test_split_csv_and_truthy() {
        assert_eq!(split_csv(" a@x.com, ,b@y.com "), vec!["a@x.com", "b@y.com"]);
        assert!(split_csv("").is_empty());
        assert!(is_truthy("YES"));
        assert!(is_truthy(" 1 "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("nope"));
    }
}
