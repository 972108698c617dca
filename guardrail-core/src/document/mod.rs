//! Declarative API documents
//!
//! An [`OperationSet`] describes a REST-style API: operations with their
//! schemas, runtime guardrails and declared error patterns. Documents are
//! read from JSON or YAML. Loading performs only the structural checks the
//! executor relies on (unique ids, usable paths, bounded retries); deeper
//! document validation is the author's tooling's job.
//!
//! # Example
//!
//! ```rust,no_run
//! use guardrail_core::document::OperationSet;
//!
//! let operations = OperationSet::load("api.yaml")?;
//! for op in operations.iter() {
//!     println!("{} {} {}", op.id, op.method, op.path);
//! }
//! # Ok::<(), guardrail_core::error::GuardrailError>(())
//! ```

mod operation;
mod policy;

pub use operation::{
    ErrorCategory, ErrorPattern, ErrorSignal, HttpMethod, Operation, Workflow,
};
pub use policy::{
    GuardrailPolicy, MAX_RETRIES_LIMIT, RateLimit, RetryPolicy, RetryStrategy, SideEffect,
};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{GuardrailError, Result};

/// Ordered, read-only set of operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSet {
    /// Document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Document version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Default base URL for requests
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "base_url")]
    pub base_url: Option<String>,

    /// Document-level auth headers
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        alias = "auth_headers"
    )]
    pub auth_headers: BTreeMap<String, String>,

    /// Operations in declaration order
    #[serde(default)]
    pub operations: Vec<Operation>,

    /// Usage patterns (metadata only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<Workflow>,
}

impl OperationSet {
    /// Build a set from operations, checking structure
    pub fn new(operations: Vec<Operation>) -> Result<Self> {
        Self {
            operations,
            ..Default::default()
        }
        .checked()
    }

    /// Set the default base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a document-level header
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_headers.insert(name.into(), value.into());
        self
    }

    /// Parse a JSON document
    pub fn from_json_str(input: &str) -> Result<Self> {
        let set: OperationSet = serde_json::from_str(input)?;
        set.checked()
    }

    /// Parse a YAML document
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let set: OperationSet = serde_yaml::from_str(input)?;
        set.checked()
    }

    /// Load a document, choosing the format from the file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let set = match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_json_str(&content).or_else(|_| Self::from_yaml_str(&content))?,
        };

        tracing::debug!(
            path = %path.display(),
            operations = set.len(),
            "Loaded operation set"
        );
        Ok(set)
    }

    /// Look up an operation by id
    pub fn get(&self, op_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == op_id)
    }

    /// Whether the set declares `op_id`
    pub fn contains(&self, op_id: &str) -> bool {
        self.get(op_id).is_some()
    }

    /// Operation ids in declaration order
    pub fn operation_ids(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.id.as_str()).collect()
    }

    /// Iterate over operations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn checked(mut self) -> Result<Self> {
        let mut seen = HashSet::new();
        for op in &mut self.operations {
            if op.id.trim().is_empty() {
                return Err(GuardrailError::Document(
                    "operation with empty id".to_string(),
                ));
            }
            if !seen.insert(op.id.clone()) {
                return Err(GuardrailError::Document(format!(
                    "duplicate operation id: {}",
                    op.id
                )));
            }
            if !op.path.starts_with('/') {
                return Err(GuardrailError::Document(format!(
                    "path for {} must start with '/': {}",
                    op.id, op.path
                )));
            }
            if let Some(retry) = op.guardrails.as_mut().and_then(|g| g.retry.as_mut()) {
                if retry.max_retries > MAX_RETRIES_LIMIT {
                    tracing::warn!(
                        operation = %op.id,
                        declared = retry.max_retries,
                        "Clamping max retries to {}",
                        MAX_RETRIES_LIMIT
                    );
                    retry.max_retries = MAX_RETRIES_LIMIT;
                }
            }
        }
        Ok(self)
    }
}
