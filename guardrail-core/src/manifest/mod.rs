//! Tool manifest for LLM tool calling
//!
//! Turns an [`OperationSet`] into tool definitions a chat model can invoke
//! and maps the model's invocations back to operation ids and arguments.
//! Tool names are restricted to `[A-Za-z0-9_-]{1,64}`, so ids outside that
//! alphabet are sanitised and the mapping kept in both directions.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::document::{Operation, OperationSet, RetryStrategy};
use crate::error::{GuardrailError, Result};
use crate::llm::{ToolDefinition, ToolInvocation};

/// Longest tool name providers accept
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// A tool invocation resolved against the manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCall {
    pub op_id: String,
    pub args: Value,
}

/// Tool definitions for an operation set, in document order
#[derive(Debug, Clone, Default)]
pub struct ToolManifest {
    tools: Vec<ToolDefinition>,
    /// tool name -> operation id
    operations: HashMap<String, String>,
}

impl ToolManifest {
    /// All tool definitions
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definition by tool name
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Operation id behind a tool name
    pub fn operation_id(&self, tool_name: &str) -> Option<&str> {
        self.operations.get(tool_name).map(String::as_str)
    }

    /// Tool name exposed for an operation id
    pub fn tool_name(&self, op_id: &str) -> Option<&str> {
        self.operations
            .iter()
            .find(|(_, id)| id.as_str() == op_id)
            .map(|(name, _)| name.as_str())
    }

    /// Map a model invocation to an operation id and parsed arguments.
    ///
    /// Empty (or `null`) argument text resolves to `{}`.
    pub fn resolve(&self, invocation: &ToolInvocation) -> Result<ResolvedCall> {
        let op_id = self
            .operation_id(&invocation.name)
            .ok_or_else(|| GuardrailError::UnknownOperation(invocation.name.clone()))?;

        let raw = invocation.arguments.trim();
        let args = if raw.is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Null) => Value::Object(Map::new()),
                Ok(value) => value,
                Err(e) => {
                    return Err(GuardrailError::InvalidRequest {
                        operation: op_id.to_string(),
                        reason: format!("tool arguments are not valid JSON: {}", e),
                    });
                }
            }
        };

        Ok(ResolvedCall {
            op_id: op_id.to_string(),
            args,
        })
    }
}

/// Build the tool manifest for `operations`
pub fn build_manifest(operations: &OperationSet) -> ToolManifest {
    let mut manifest = ToolManifest::default();

    for operation in operations.iter() {
        let name = unique_name(&manifest.operations, sanitize_tool_name(&operation.id));
        if name != operation.id {
            tracing::debug!(operation = %operation.id, tool = %name, "Sanitised tool name");
        }
        manifest.tools.push(ToolDefinition {
            name: name.clone(),
            description: describe(operation),
            parameters: parameters_schema(&operation.input_schema),
        });
        manifest.operations.insert(name, operation.id.clone());
    }

    manifest
}

/// Restrict `id` to the tool-name alphabet and length
pub fn sanitize_tool_name(id: &str) -> String {
    let mut name: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_NAME_LEN)
        .collect();
    if name.is_empty() {
        name.push_str("operation");
    }
    name
}

fn unique_name(taken: &HashMap<String, String>, base: String) -> String {
    if !taken.contains_key(&base) {
        return base;
    }
    (2..)
        .map(|n| {
            let suffix = format!("_{}", n);
            let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
            format!("{}{}", &base[..keep], suffix)
        })
        .find(|candidate| !taken.contains_key(candidate))
        .unwrap_or(base)
}

fn describe(operation: &Operation) -> String {
    let mut description = operation
        .summary
        .clone()
        .or_else(|| operation.description.clone())
        .unwrap_or_else(|| format!("{} {}", operation.method, operation.path));

    if let Some(guardrails) = &operation.guardrails {
        if let Some(side_effect) = guardrails.side_effect {
            description.push_str(&format!(" Side effect: {}.", side_effect.label()));
        }
        if let Some(retry) = guardrails
            .retry
            .as_ref()
            .filter(|r| r.strategy != RetryStrategy::None && r.max_retries > 0)
        {
            description.push_str(&format!(
                " Retried automatically ({}, up to {}).",
                retry.strategy, retry.max_retries
            ));
        }
    }

    description
}

/// Tool parameters must be an object schema
fn parameters_schema(input_schema: &Value) -> Value {
    match input_schema {
        Value::Object(schema) if schema.contains_key("type") || schema.contains_key("properties") => {
            input_schema.clone()
        }
        _ => serde_json::json!({"type": "object", "properties": {}}),
    }
}
