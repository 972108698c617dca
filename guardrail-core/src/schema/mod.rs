//! Schema validation contract
//!
//! The executor validates arguments before building a request and, warn-only,
//! response bodies after a 2xx. Any validator can be plugged in through
//! [`SchemaValidator`]; [`CompiledValidator`] compiles each schema once with
//! the `jsonschema` crate and caches it for the life of the validator.

mod compiled;

pub use compiled::CompiledValidator;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON path of the offending value (`$` is the root)
    pub path: String,
    /// What was wrong
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating one value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

impl ValidationReport {
    /// A passing report
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Report from collected violations
    pub fn from_errors(errors: Vec<SchemaViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validates values against JSON Schemas
pub trait SchemaValidator: Send + Sync {
    /// Validate `value` against `schema`
    fn validate(&self, schema: &Value, value: &Value) -> ValidationReport;
}
