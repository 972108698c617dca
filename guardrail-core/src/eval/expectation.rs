//! Declarative task files
//!
//! Tasks can be written as data instead of code: a prompt plus an
//! expectation that compiles into the success predicate. Task files are JSON
//! or YAML, either a bare list of tasks or `{ "tasks": [...] }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use super::task::EvaluationTask;
use crate::error::{GuardrailError, Result};

/// A task as written in a task file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,

    pub prompt: String,

    /// Per-task timeout (e.g. "90s")
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// What a successful result looks like
    #[serde(default, alias = "expected")]
    pub expect: TaskExpectation,
}

/// Conditions a result must meet; all present conditions must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskExpectation {
    /// Exact result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,

    /// Result is an array of this length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_len: Option<usize>,

    /// Substrings the serialized result must contain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,

    /// Checks on values inside the result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_path_checks: Vec<JsonPathCheck>,
}

/// A check on the value at a dot-separated path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPathCheck {
    /// Path like `items.0.name`; empty means the whole result
    pub path: String,

    pub operator: CheckOperator,

    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

impl TaskExpectation {
    /// Messages for every condition `result` fails; empty when it passes
    pub fn failures(&self, result: &Value) -> Vec<String> {
        let mut failures = Vec::new();

        if let Some(expected) = &self.equals {
            if expected != result {
                failures.push(format!("expected {} but got {}", expected, result));
            }
        }

        if let Some(len) = self.array_len {
            match result.as_array() {
                Some(items) if items.len() == len => {}
                Some(items) => failures.push(format!(
                    "expected {} elements but got {}",
                    len,
                    items.len()
                )),
                None => failures.push(format!("expected an array of {} elements", len)),
            }
        }

        if !self.contains.is_empty() {
            let text = match result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            for pattern in &self.contains {
                if !text.contains(pattern.as_str()) {
                    failures.push(format!("result does not contain '{}'", pattern));
                }
            }
        }

        for check in &self.json_path_checks {
            if let Some(message) = check.failure(result) {
                failures.push(message);
            }
        }

        failures
    }

    pub fn is_met(&self, result: &Value) -> bool {
        self.failures(result).is_empty()
    }
}

impl JsonPathCheck {
    pub fn new(path: impl Into<String>, operator: CheckOperator, value: Value) -> Self {
        Self {
            path: path.into(),
            operator,
            value,
        }
    }

    fn failure(&self, result: &Value) -> Option<String> {
        let actual = get_json_path(result, &self.path);
        let passes = match self.operator {
            CheckOperator::Equals => actual == Some(&self.value),
            CheckOperator::NotEquals => actual != Some(&self.value),
            CheckOperator::Contains => match (actual, &self.value) {
                (Some(Value::String(s)), Value::String(pattern)) => s.contains(pattern.as_str()),
                (Some(Value::Array(items)), expected) => items.contains(expected),
                _ => false,
            },
            CheckOperator::GreaterThan => compare(actual, &self.value, |a, b| a > b),
            CheckOperator::LessThan => compare(actual, &self.value, |a, b| a < b),
            CheckOperator::Exists => actual.is_some_and(|v| !v.is_null()),
        };

        (!passes).then(|| {
            format!(
                "json_path[{}] {:?} {} failed (actual: {})",
                self.path,
                self.operator,
                self.value,
                actual.cloned().unwrap_or(Value::Null)
            )
        })
    }
}

fn compare(actual: Option<&Value>, expected: &Value, op: fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Dot-path lookup; numeric segments index arrays
pub fn get_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for key in path.split('.').filter(|k| !k.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

impl TaskSpec {
    /// Compile into a task scored by the expectation
    pub fn into_task(self) -> EvaluationTask {
        let expect = self.expect;
        let mut task =
            EvaluationTask::new(self.id, self.prompt, move |result| expect.is_met(result));
        task.timeout = self.timeout;
        task.tags = self.tags;
        task
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<TaskSpec>),
    Wrapped { tasks: Vec<TaskSpec> },
}

/// Parse task specs from JSON or YAML text
pub fn parse_task_specs(input: &str, yaml: bool) -> Result<Vec<TaskSpec>> {
    let file: TaskFile = if yaml {
        serde_yaml::from_str(input)?
    } else {
        serde_json::from_str(input)?
    };
    let specs = match file {
        TaskFile::List(specs) | TaskFile::Wrapped { tasks: specs } => specs,
    };

    let mut seen = std::collections::HashSet::new();
    for spec in &specs {
        if !seen.insert(spec.id.as_str()) {
            return Err(GuardrailError::Document(format!("duplicate task id: {}", spec.id)));
        }
    }
    Ok(specs)
}

/// Load tasks from a `.json`, `.yaml` or `.yml` file
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<EvaluationTask>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let specs = parse_task_specs(&content, yaml)?;
    tracing::info!(path = %path.display(), tasks = specs.len(), "Loaded evaluation tasks");
    Ok(specs.into_iter().map(TaskSpec::into_task).collect())
}
