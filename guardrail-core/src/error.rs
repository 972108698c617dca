//! Error types for guarded execution

use crate::executor::ClassifiedError;
use crate::schema::SchemaViolation;

/// Result type for guardrail operations
pub type Result<T> = std::result::Result<T, GuardrailError>;

/// Error types for the guardrail engine
///
/// The first four variants are local: they are raised before any request
/// leaves the process and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    /// Requested operation id is not part of the operation set
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Arguments did not satisfy the operation's input schema
    #[error("Invalid input for {operation}: {}", format_violations(.violations))]
    InvalidInput {
        operation: String,
        violations: Vec<SchemaViolation>,
    },

    /// A `{name}` path token had no matching argument
    #[error("Missing path parameter '{parameter}' for {operation}")]
    MissingParameter { operation: String, parameter: String },

    /// The request could not be assembled (bad base URL, non-object arguments)
    #[error("Invalid request for {operation}: {reason}")]
    InvalidRequest { operation: String, reason: String },

    /// Non-2xx response after classification
    #[error("{operation} failed: {error}")]
    Http {
        operation: String,
        retries: u32,
        error: ClassifiedError,
    },

    /// Timeout or connection-level failure after classification
    #[error("{operation} transport failure: {error}")]
    Transport {
        operation: String,
        retries: u32,
        error: ClassifiedError,
    },

    /// Operation document could not be loaded
    #[error("Document error: {0}")]
    Document(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Result could not be extracted from model output
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.path, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl GuardrailError {
    /// Whether the failure happened before any network activity
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            GuardrailError::UnknownOperation(_)
                | GuardrailError::InvalidInput { .. }
                | GuardrailError::MissingParameter { .. }
                | GuardrailError::InvalidRequest { .. }
        )
    }

    /// Classified payload for HTTP and transport failures
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            GuardrailError::Http { error, .. } | GuardrailError::Transport { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    /// Whether the classifier considered the final failure retryable
    pub fn is_retryable(&self) -> bool {
        self.classified().is_some_and(|e| e.retryable)
    }

    /// HTTP status of the final response, if one was received
    pub fn status(&self) -> Option<u16> {
        self.classified().and_then(|e| e.status)
    }

    /// Machine-readable error code
    pub fn code(&self) -> &str {
        match self {
            GuardrailError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            GuardrailError::InvalidInput { .. } => "INVALID_INPUT",
            GuardrailError::MissingParameter { .. } => "MISSING_PARAMETER",
            GuardrailError::InvalidRequest { .. } => "INVALID_REQUEST",
            GuardrailError::Http { error, .. } | GuardrailError::Transport { error, .. } => {
                &error.code
            }
            GuardrailError::Document(_) => "DOCUMENT_ERROR",
            GuardrailError::Configuration(_) => "CONFIGURATION_ERROR",
            GuardrailError::Llm(_) => "LLM_ERROR",
            GuardrailError::Extraction(_) => "EXTRACTION_ERROR",
            GuardrailError::Serialization(_) | GuardrailError::Yaml(_) => "SERIALIZATION_ERROR",
            GuardrailError::Io(_) => "IO_ERROR",
            GuardrailError::Other(_) => "ERROR",
        }
    }

    /// Retries spent before the call failed (zero for local failures)
    pub fn retries(&self) -> u32 {
        match self {
            GuardrailError::Http { retries, .. } | GuardrailError::Transport { retries, .. } => {
                *retries
            }
            _ => 0,
        }
    }
}

impl From<String> for GuardrailError {
    fn from(s: String) -> Self {
        GuardrailError::Other(s)
    }
}

impl From<&str> for GuardrailError {
    fn from(s: &str) -> Self {
        GuardrailError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for GuardrailError {
    fn from(err: anyhow::Error) -> Self {
        GuardrailError::Other(err.to_string())
    }
}
