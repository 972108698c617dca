//! Evaluation tasks

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Success predicate over a treatment's result
pub type SuccessPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One task every treatment is asked to solve
#[derive(Clone)]
pub struct EvaluationTask {
    /// Task identifier
    pub id: String,

    /// Prompt given to the model
    pub prompt: String,

    /// Overrides the harness default when set
    pub timeout: Option<Duration>,

    /// Free-form tags
    pub tags: Vec<String>,

    predicate: SuccessPredicate,
}

impl EvaluationTask {
    /// Create a task scored by `predicate`
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            timeout: None,
            tags: Vec::new(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Score a result. A panicking predicate counts as failure.
    pub fn is_success(&self, result: &Value) -> bool {
        let predicate = &self.predicate;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| predicate(result)))
            .unwrap_or_else(|_| {
                tracing::warn!(task = %self.id, "Success predicate panicked");
                false
            })
    }
}

impl std::fmt::Debug for EvaluationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationTask")
            .field("id", &self.id)
            .field("prompt", &self.prompt)
            .field("timeout", &self.timeout)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predicate_scores_result() {
        let task = EvaluationTask::new("three", "List three items", |v| {
            v.as_array().is_some_and(|a| a.len() == 3)
        });
        assert!(task.is_success(&json!([1, 2, 3])));
        assert!(!task.is_success(&json!([1, 2])));
    }

    #[test]
    fn test_panicking_predicate_is_failure() {
        let task = EvaluationTask::new("bad", "prompt", |v| v["n"].as_u64().unwrap() > 1);
        assert!(!task.is_success(&json!({})));
    }
}
