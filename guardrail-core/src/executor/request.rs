//! Request construction
//!
//! Maps an operation plus an argument object to a concrete HTTP request.
//! Pure: no I/O, same inputs always give the same request.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ExecutorConfig;
use crate::document::{HttpMethod, Operation, OperationSet};
use crate::error::{GuardrailError, Result};

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved connection settings for a session
///
/// Built once and never mutated by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Base URL every operation path is appended to
    pub base_url: String,

    /// Session auth headers
    pub auth_headers: BTreeMap<String, String>,

    /// Headers declared on the operation document
    pub document_headers: BTreeMap<String, String>,

    /// Timeout used when an operation declares none
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
}

impl ExecutionContext {
    /// Create a context for `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_headers: BTreeMap::new(),
            document_headers: BTreeMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Context for a document, preferring an explicit base URL over the document's
    pub fn for_operations(base_url: Option<&str>, operations: &OperationSet) -> Result<Self> {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| operations.base_url.clone())
            .ok_or_else(|| {
                GuardrailError::Configuration(
                    "no base URL configured and the document declares none".to_string(),
                )
            })?;

        Ok(Self::new(base_url).with_document_headers(operations.auth_headers.clone()))
    }

    /// Context from executor configuration and a document
    pub fn from_config(config: &ExecutorConfig, operations: &OperationSet) -> Result<Self> {
        let mut context = Self::for_operations(config.base_url.as_deref(), operations)?
            .with_default_timeout(config.default_timeout);
        context.auth_headers.extend(config.auth_headers.clone());
        Ok(context)
    }

    /// Add a session auth header
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.insert(name.into(), value.into());
        self
    }

    /// Replace the document-level headers
    pub fn with_document_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.document_headers = headers;
        self
    }

    /// Set the default per-attempt timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Request headers: content type, session auth, document headers, then
    /// `extra`. Later sources win; names compare case-insensitively.
    pub fn headers_with(&self, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        for source in [&self.auth_headers, &self.document_headers, extra] {
            for (name, value) in source {
                headers.retain(|existing: &String, _| !existing.eq_ignore_ascii_case(name));
                headers.insert(name.clone(), value.clone());
            }
        }
        headers
    }
}

/// Fully resolved HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// Build the request for `operation` called with `args`
///
/// Path tokens are filled from `args` and percent-encoded. Arguments not
/// consumed by the path become query parameters for GET and DELETE and a
/// JSON body otherwise. Headers merge in order: content type, session auth,
/// document headers, operation headers; later entries win.
pub fn build_request(
    context: &ExecutionContext,
    operation: &Operation,
    args: &Value,
) -> Result<HttpRequest> {
    let mut remaining = match args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(GuardrailError::InvalidRequest {
                operation: operation.id.clone(),
                reason: format!("arguments must be an object, got {}", other),
            });
        }
    };

    let path = fill_path(operation, &mut remaining)?;
    let full = format!("{}{}", context.base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&full).map_err(|e| GuardrailError::InvalidRequest {
        operation: operation.id.clone(),
        reason: format!("invalid URL '{}': {}", full, e),
    })?;

    let mut body = None;
    if operation.method.uses_query_arguments() {
        let pairs = query_pairs(&remaining);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
    } else if !remaining.is_empty() {
        body = Some(serde_json::to_string(&Value::Object(remaining))?);
    }

    let headers = context.headers_with(&operation.auth_headers);

    let timeout = operation
        .guardrails
        .as_ref()
        .and_then(|g| g.timeout())
        .unwrap_or(context.default_timeout);

    Ok(HttpRequest {
        method: operation.method,
        url: url.to_string(),
        headers,
        body,
        timeout,
    })
}

fn fill_path(operation: &Operation, remaining: &mut Map<String, Value>) -> Result<String> {
    let mut path = operation.path.clone();
    for name in operation.path_parameters() {
        let value = match remaining.remove(name) {
            Some(Value::Null) | None => {
                return Err(GuardrailError::MissingParameter {
                    operation: operation.id.clone(),
                    parameter: name.to_string(),
                });
            }
            Some(value) => value,
        };
        let rendered = scalar_text(&value);
        path = path.replace(&format!("{{{}}}", name), &urlencoding::encode(&rendered));
    }
    Ok(path)
}

fn query_pairs(args: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in args {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GuardrailPolicy;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new("https://api.example.com/v1/")
            .with_auth_header("Authorization", "Bearer session")
    }

    #[test]
    fn test_get_moves_leftovers_to_query() {
        let op = Operation::new("getItem", HttpMethod::Get, "/items/{id}");
        let request = build_request(&context(), &op, &json!({"id": 42, "verbose": true})).unwrap();

        assert_eq!(request.url, "https://api.example.com/v1/items/42?verbose=true");
        assert!(request.body.is_none());
        assert_eq!(request.method, HttpMethod::Get);
    }

    #[test]
    fn test_post_moves_leftovers_to_body() {
        let op = Operation::new("createItem", HttpMethod::Post, "/items");
        let request = build_request(&context(), &op, &json!({"id": 42})).unwrap();

        assert_eq!(request.url, "https://api.example.com/v1/items");
        assert_eq!(request.body.as_deref(), Some(r#"{"id":42}"#));
    }

    #[test]
    fn test_missing_path_parameter() {
        let op = Operation::new("getItem", HttpMethod::Get, "/items/{id}");
        let err = build_request(&context(), &op, &json!({"verbose": true})).unwrap_err();
        assert!(matches!(
            err,
            GuardrailError::MissingParameter { ref parameter, .. } if parameter == "id"
        ));

        let err = build_request(&context(), &op, &json!({"id": null})).unwrap_err();
        assert!(err.is_local());
    }

    #[test]
    fn test_repeated_path_parameter() {
        let op = Operation::new("mutualFriend", HttpMethod::Get, "/users/{id}/friends/{id}");
        let request = build_request(&context(), &op, &json!({"id": 7, "depth": 2})).unwrap();
        assert_eq!(request.url, "https://api.example.com/v1/users/7/friends/7?depth=2");
    }

    #[test]
    fn test_path_values_are_encoded() {
        let op = Operation::new("getUser", HttpMethod::Get, "/users/{name}");
        let request = build_request(&context(), &op, &json!({"name": "a b/c"})).unwrap();
        assert_eq!(request.url, "https://api.example.com/v1/users/a%20b%2Fc");
    }

    #[test]
    fn test_array_query_values_repeat_key() {
        let op = Operation::new("search", HttpMethod::Delete, "/items");
        let request =
            build_request(&context(), &op, &json!({"id": [1, 2], "skip": null})).unwrap();
        assert_eq!(request.url, "https://api.example.com/v1/items?id=1&id=2");
    }

    #[test]
    fn test_header_precedence() {
        let ctx = context().with_document_headers(BTreeMap::from([
            ("X-Api-Key".to_string(), "doc".to_string()),
            ("authorization".to_string(), "Bearer document".to_string()),
        ]));
        let op = Operation::new("ping", HttpMethod::Get, "/ping").with_auth_header("X-Api-Key", "op");

        let request = build_request(&ctx, &op, &Value::Null).unwrap();
        assert_eq!(request.headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(request.headers.get("X-Api-Key").unwrap(), "op");
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer document");
        assert!(!request.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_timeout_resolution() {
        let ctx = context().with_default_timeout(Duration::from_secs(9));
        let op = Operation::new("ping", HttpMethod::Get, "/ping");
        assert_eq!(build_request(&ctx, &op, &json!({})).unwrap().timeout, Duration::from_secs(9));

        let op = op.with_guardrails(GuardrailPolicy::default().with_timeout(Duration::from_millis(250)));
        assert_eq!(
            build_request(&ctx, &op, &json!({})).unwrap().timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let op = Operation::new("ping", HttpMethod::Get, "/ping");
        let err = build_request(&context(), &op, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, GuardrailError::InvalidRequest { .. }));
    }

    #[test]
    fn test_context_requires_base_url() {
        let set = OperationSet::default();
        assert!(ExecutionContext::for_operations(None, &set).is_err());

        let set = set.with_base_url("http://localhost:8080");
        let ctx = ExecutionContext::for_operations(None, &set).unwrap();
        assert_eq!(ctx.base_url, "http://localhost:8080");
        let ctx = ExecutionContext::for_operations(Some("http://override"), &set).unwrap();
        assert_eq!(ctx.base_url, "http://override");
    }
}
