//! Outcome of one task under one treatment

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::TokenUsage;

/// HTTP activity of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetrics {
    /// Requests that reached the transport, retries included
    pub http_calls: u32,
    /// Calls rejected before any request (bad arguments, unknown tool)
    pub invalid_calls: u32,
    /// Retries spent
    pub retries: u32,
    /// Calls that ended in a non-2xx status or transport failure
    pub http_errors: u32,
}

impl std::ops::AddAssign for CallMetrics {
    fn add_assign(&mut self, other: Self) {
        self.http_calls += other.http_calls;
        self.invalid_calls += other.invalid_calls;
        self.retries += other.retries;
        self.http_errors += other.http_errors;
    }
}

/// Tokens spent by one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenCounts {
    /// Add one completion's usage
    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.input += usage.prompt_tokens as u64;
        self.output += usage.completion_tokens as u64;
        self.total += usage.total_tokens as u64;
    }
}

/// Immutable result of running one task under one treatment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub task_id: String,
    pub treatment: String,
    pub success: bool,
    pub duration_ms: u64,
    pub tokens: TokenCounts,
    pub calls: CallMetrics,
    /// Value the predicate scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Why the treatment failed, timed out or panicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
