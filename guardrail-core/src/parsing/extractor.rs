//! Extractor trait and failure type

use serde_json::Value;
use thiserror::Error;

use crate::error::GuardrailError;

/// Why no result could be recovered
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionFailure {
    /// Nothing to extract from
    #[error("Empty input")]
    EmptyInput,

    /// No JSON value found in the text
    #[error("No JSON value found")]
    NotFound,

    /// A candidate was found but could not be parsed or repaired
    #[error("Malformed JSON: {0}")]
    Malformed(String),
}

impl From<ExtractionFailure> for GuardrailError {
    fn from(failure: ExtractionFailure) -> Self {
        GuardrailError::Extraction(failure.to_string())
    }
}

/// Recovers a result value from raw model text
pub trait ResultExtractor: Send + Sync {
    /// Extract a value from `raw`
    fn extract(&self, raw: &str) -> Result<Value, ExtractionFailure>;

    /// Extractor name for logs
    fn name(&self) -> &'static str;
}

/// Configuration for extractor behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Attempt to repair malformed input
    pub attempt_repair: bool,
    /// Strip markdown code fences
    pub strip_code_fences: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            attempt_repair: true,
            strip_code_fences: true,
        }
    }
}

impl ExtractorConfig {
    /// No repair attempts
    pub fn strict() -> Self {
        Self {
            attempt_repair: false,
            strip_code_fences: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExtractorConfig::default();
        assert!(config.attempt_repair);
        assert!(config.strip_code_fences);
    }

    #[test]
    fn test_config_strict() {
        assert!(!ExtractorConfig::strict().attempt_repair);
    }

    #[test]
    fn test_failure_converts_to_guardrail_error() {
        let err: GuardrailError = ExtractionFailure::NotFound.into();
        assert_eq!(err.to_string(), "Extraction error: No JSON value found");
    }
}
