//! Operation definitions and declared error patterns

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::policy::{GuardrailPolicy, RetryPolicy};

/// One logical API action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Unique operation id
    #[serde(alias = "opId", alias = "op_id")]
    pub id: String,

    /// HTTP method
    pub method: HttpMethod,

    /// Path template with `{param}` placeholders
    pub path: String,

    /// One-line summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the argument object
    #[serde(default = "default_input_schema", alias = "input_schema", alias = "input")]
    pub input_schema: Value,

    /// JSON Schema for the response body (advisory)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "output_schema",
        alias = "output"
    )]
    pub output_schema: Option<Value>,

    /// Runtime policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailPolicy>,

    /// Declared error patterns, checked in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorPattern>,

    /// Operation-level auth headers
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        alias = "auth_headers"
    )]
    pub auth_headers: BTreeMap<String, String>,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

pub(crate) fn default_input_schema() -> Value {
    serde_json::json!({"type": "object"})
}

impl Operation {
    /// Create an operation with an open object input schema
    pub fn new(id: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method,
            path: path.into(),
            summary: None,
            description: None,
            input_schema: default_input_schema(),
            output_schema: None,
            guardrails: None,
            errors: Vec::new(),
            auth_headers: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Set the summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Set the input schema
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the output schema
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Attach a guardrail policy
    pub fn with_guardrails(mut self, policy: GuardrailPolicy) -> Self {
        self.guardrails = Some(policy);
        self
    }

    /// Declare an error pattern
    pub fn with_error(mut self, pattern: ErrorPattern) -> Self {
        self.errors.push(pattern);
        self
    }

    /// Add an operation-level header
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.insert(name.into(), value.into());
        self
    }

    /// Declared retry policy, if any
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.guardrails.as_ref().and_then(|g| g.retry.as_ref())
    }

    /// Distinct names of `{param}` placeholders in the path, in order of first appearance
    pub fn path_parameters(&self) -> Vec<&str> {
        let mut params = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                break;
            };
            let name = &after[..close];
            if !params.contains(&name) {
                params.push(name);
            }
            rest = &after[close + 1..];
        }
        params
    }
}

/// HTTP method of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Leftover arguments go to the query string rather than a body
    pub fn uses_query_arguments(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

/// Response signal an error pattern matches on
///
/// A quoted three-digit code in the 100-599 range (`"503"`) is read as an
/// HTTP status, the way API descriptions commonly key responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorSignal {
    /// HTTP status code
    Status(u16),
    /// Provider error code found in the response body
    Provider(String),
}

impl ErrorSignal {
    fn from_text(text: String) -> Self {
        let numeric = text.len() == 3 && text.bytes().all(|b| b.is_ascii_digit());
        match text.parse::<u16>() {
            Ok(code) if numeric && (100..=599).contains(&code) => ErrorSignal::Status(code),
            _ => ErrorSignal::Provider(text),
        }
    }
}

impl<'de> Deserialize<'de> for ErrorSignal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Status(u16),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Status(code) => ErrorSignal::Status(code),
            Raw::Text(text) => ErrorSignal::from_text(text),
        })
    }
}

/// Declared mapping from a response signal to a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    /// Signal to match
    pub code: ErrorSignal,

    /// Machine-readable error name reported to callers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Whether the failure may be retried
    #[serde(default)]
    pub retryable: bool,

    /// Hint for the caller on how to recover
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "recovery_hint")]
    pub recovery_hint: Option<String>,

    /// Failure category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,

    /// Fixed message overriding the response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorPattern {
    /// Pattern matching an HTTP status
    pub fn status(code: u16, retryable: bool) -> Self {
        Self {
            code: ErrorSignal::Status(code),
            name: None,
            retryable,
            recovery_hint: None,
            category: None,
            message: None,
        }
    }

    /// Pattern matching a provider error code
    pub fn provider(code: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: ErrorSignal::Provider(code.into()),
            ..Self::status(0, retryable)
        }
    }

    /// Set the reported error name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the recovery hint
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// Set the category
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Server,
    Network,
    Unknown,
}

impl ErrorCategory {
    /// Category implied by a bare HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCategory::Validation,
            401 => ErrorCategory::Authentication,
            403 => ErrorCategory::Authorization,
            404 | 410 => ErrorCategory::NotFound,
            409 | 412 => ErrorCategory::Conflict,
            429 => ErrorCategory::RateLimit,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        }
    }
}

/// Descriptive usage pattern; never executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_parameters() {
        let op = Operation::new("getComment", HttpMethod::Get, "/posts/{postId}/comments/{id}");
        assert_eq!(op.path_parameters(), vec!["postId", "id"]);

        let op = Operation::new("friendOf", HttpMethod::Get, "/users/{id}/friends/{id}");
        assert_eq!(op.path_parameters(), vec!["id"]);

        let op = Operation::new("list", HttpMethod::Get, "/items");
        assert!(op.path_parameters().is_empty());
    }

    #[test]
    fn test_operation_accepts_op_id_alias() {
        let op: Operation = serde_json::from_value(json!({
            "opId": "getItem",
            "method": "get",
            "path": "/items/{id}",
            "errors": [
                {"code": 404, "retryable": false, "recoveryHint": "check the id"},
                {"code": "rate_limited", "retryable": true}
            ]
        }))
        .unwrap();

        assert_eq!(op.id, "getItem");
        assert_eq!(op.method, HttpMethod::Get);
        assert_eq!(op.input_schema, json!({"type": "object"}));
        assert_eq!(op.errors[0].code, ErrorSignal::Status(404));
        assert_eq!(
            op.errors[1].code,
            ErrorSignal::Provider("rate_limited".to_string())
        );
    }

    #[test]
    fn test_quoted_status_codes() {
        let codes: Vec<ErrorSignal> = serde_json::from_value(json!([
            "503", "429", "099", "600", "5031", "E503", 503
        ]))
        .unwrap();
        assert_eq!(
            codes,
            vec![
                ErrorSignal::Status(503),
                ErrorSignal::Status(429),
                ErrorSignal::Provider("099".to_string()),
                ErrorSignal::Provider("600".to_string()),
                ErrorSignal::Provider("5031".to_string()),
                ErrorSignal::Provider("E503".to_string()),
                ErrorSignal::Status(503),
            ]
        );

        let pattern: ErrorPattern =
            serde_yaml::from_str("code: \"503\"\nretryable: false\n").unwrap();
        assert_eq!(pattern.code, ErrorSignal::Status(503));
        assert_eq!(serde_json::to_value(&pattern.code).unwrap(), json!(503));
    }

    #[test]
    fn test_method_query_placement() {
        assert!(HttpMethod::Get.uses_query_arguments());
        assert!(HttpMethod::Delete.uses_query_arguments());
        assert!(!HttpMethod::Post.uses_query_arguments());
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_category_from_status() {
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::Server);
        assert_eq!(ErrorCategory::from_status(418), ErrorCategory::Unknown);
    }
}
