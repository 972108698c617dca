//! Error classification
//!
//! Maps a failed exchange to a [`ClassifiedError`]. Declared patterns on the
//! operation win (first match); anything undeclared falls back to the status
//! heuristic where 5xx and 429 are retryable and everything else is not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::TransportError;
use crate::document::{ErrorCategory, ErrorPattern, ErrorSignal, Operation};

/// Longest raw body excerpt carried in an error message
const MAX_MESSAGE_CHARS: usize = 500;

/// Structured failure payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    /// Machine-readable code, e.g. `NOT_FOUND` or `HTTP_503`
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// HTTP status, absent for transport failures
    pub status: Option<u16>,
    /// Whether the retry loop may try again
    pub retryable: bool,
    /// Suggested recovery action
    pub recovery_hint: Option<String>,
    /// Broad category
    pub category: ErrorCategory,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {} {}: {}", status, self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Classify a non-2xx response
pub fn classify(operation: &Operation, status: u16, body: &str) -> ClassifiedError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let body_message = parsed.as_ref().and_then(extract_message);

    let matched = operation
        .errors
        .iter()
        .find(|p| p.code == ErrorSignal::Status(status))
        .or_else(|| {
            let provider_code = parsed.as_ref().and_then(extract_provider_code)?;
            operation
                .errors
                .iter()
                .find(|p| p.code == ErrorSignal::Provider(provider_code.clone()))
        });

    let message = |pattern: Option<&ErrorPattern>| {
        pattern
            .and_then(|p| p.message.clone())
            .or_else(|| body_message.clone())
            .unwrap_or_else(|| fallback_message(status, body))
    };

    match matched {
        Some(pattern) => ClassifiedError {
            code: pattern.name.clone().unwrap_or_else(|| match &pattern.code {
                ErrorSignal::Provider(code) => code.to_ascii_uppercase(),
                ErrorSignal::Status(_) => format!("HTTP_{}", status),
            }),
            message: message(Some(pattern)),
            status: Some(status),
            retryable: pattern.retryable,
            recovery_hint: pattern
                .recovery_hint
                .clone()
                .or_else(|| default_recovery_hint(status).map(str::to_string)),
            category: pattern
                .category
                .unwrap_or_else(|| ErrorCategory::from_status(status)),
        },
        None => ClassifiedError {
            code: format!("HTTP_{}", status),
            message: message(None),
            status: Some(status),
            retryable: is_retryable_status(status),
            recovery_hint: default_recovery_hint(status).map(str::to_string),
            category: ErrorCategory::from_status(status),
        },
    }
}

/// Classify a timeout or connection failure; retryable by default
pub fn classify_transport(error: &TransportError) -> ClassifiedError {
    let code = match error {
        TransportError::Timeout(_) => "TIMEOUT",
        TransportError::Connect(_) => "CONNECTION_FAILED",
        TransportError::Other(_) => "NETWORK_ERROR",
    };
    ClassifiedError {
        code: code.to_string(),
        message: error.to_string(),
        status: None,
        retryable: true,
        recovery_hint: Some("The service may be unavailable; retry later".to_string()),
        category: ErrorCategory::Network,
    }
}

/// Fallback retryability for undeclared statuses
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

fn default_recovery_hint(status: u16) -> Option<&'static str> {
    match status {
        400 | 422 => Some("Check the arguments against the operation's input schema"),
        401 => Some("Check the configured credentials"),
        403 => Some("The credentials lack permission for this operation"),
        404 => Some("Verify the identifiers in the request exist"),
        409 => Some("The resource changed; fetch it again before retrying"),
        429 => Some("Rate limited; wait before retrying"),
        500..=599 => Some("Server error; retry later"),
        _ => None,
    }
}

fn extract_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.get("message"),
        body.get("error"),
        body.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

fn extract_provider_code(body: &Value) -> Option<String> {
    [body.pointer("/error/code"), body.get("code")]
        .into_iter()
        .flatten()
        .find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn fallback_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("request failed with status {}", status);
    }
    trimmed.chars().take(MAX_MESSAGE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HttpMethod;
    use std::time::Duration;

    fn operation() -> Operation {
        Operation::new("getItem", HttpMethod::Get, "/items/{id}")
            .with_error(
                ErrorPattern::status(404, false)
                    .with_name("ITEM_NOT_FOUND")
                    .with_recovery_hint("List items to find a valid id"),
            )
            .with_error(ErrorPattern::status(503, false))
            .with_error(
                ErrorPattern::provider("quota_exceeded", true)
                    .with_category(ErrorCategory::RateLimit),
            )
    }

    #[test]
    fn test_declared_status_wins() {
        let err = classify(&operation(), 404, r#"{"error": {"message": "no such item"}}"#);
        assert_eq!(err.code, "ITEM_NOT_FOUND");
        assert_eq!(err.message, "no such item");
        assert!(!err.retryable);
        assert_eq!(err.recovery_hint.as_deref(), Some("List items to find a valid id"));
        assert_eq!(err.category, ErrorCategory::NotFound);
    }

    #[test]
    fn test_declared_pattern_overrides_heuristic() {
        // 503 is retryable by default but declared otherwise
        let err = classify(&operation(), 503, "");
        assert!(!err.retryable);
        assert_eq!(err.code, "HTTP_503");
    }

    #[test]
    fn test_quoted_declared_status_matches() {
        let op: Operation = serde_json::from_value(serde_json::json!({
            "id": "getItem",
            "method": "GET",
            "path": "/items/{id}",
            "errors": [{"code": "503", "retryable": false}]
        }))
        .unwrap();

        let err = classify(&op, 503, "");
        assert!(!err.retryable);
        assert_eq!(err.code, "HTTP_503");
    }

    #[test]
    fn test_provider_code_match() {
        let err = classify(&operation(), 400, r#"{"code": "quota_exceeded", "message": "slow down"}"#);
        assert!(err.retryable);
        assert_eq!(err.code, "QUOTA_EXCEEDED");
        assert_eq!(err.category, ErrorCategory::RateLimit);
    }

    #[test]
    fn test_fallback_heuristic() {
        let op = Operation::new("ping", HttpMethod::Get, "/ping");
        assert!(classify(&op, 500, "").retryable);
        assert!(classify(&op, 502, "").retryable);
        assert!(classify(&op, 429, "").retryable);
        assert!(!classify(&op, 400, "").retryable);
        assert!(!classify(&op, 404, "").retryable);

        let err = classify(&op, 418, "I'm a teapot");
        assert_eq!(err.message, "I'm a teapot");
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert!(err.recovery_hint.is_none());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = classify_transport(&TransportError::Timeout(Duration::from_millis(100)));
        assert!(err.retryable);
        assert_eq!(err.code, "TIMEOUT");
        assert_eq!(err.status, None);
        assert_eq!(err.category, ErrorCategory::Network);
    }

    #[test]
    fn test_display_includes_status() {
        let err = classify(&operation(), 503, "down");
        assert_eq!(err.to_string(), "HTTP 503 HTTP_503: down");
    }
}
