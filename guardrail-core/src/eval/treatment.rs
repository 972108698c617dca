//! Treatment seam

use async_trait::async_trait;
use serde_json::Value;

use super::run::{CallMetrics, TokenCounts};
use super::task::EvaluationTask;
use crate::error::Result;

/// What a treatment produced for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreatmentOutput {
    /// Value handed to the task's success predicate
    pub result: Value,
    pub tokens: TokenCounts,
    pub calls: CallMetrics,
}

impl TreatmentOutput {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, tokens: TokenCounts) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_calls(mut self, calls: CallMetrics) -> Self {
        self.calls = calls;
        self
    }
}

/// One way of driving a model against the API
///
/// Tasks run one at a time, so implementations may keep per-run state.
#[async_trait]
pub trait Treatment: Send {
    /// Attempt `task`; errors become zero-success runs
    async fn execute_task(&mut self, task: &EvaluationTask) -> Result<TreatmentOutput>;
}
