//! Evaluation harness comparing treatments on natural-language tasks
//!
//! A treatment is one way of driving a model against the API. The harness
//! runs every task under every registered treatment, scores each result with
//! the task's success predicate and aggregates the runs into a report.
//!
//! - [`ToolCallingTreatment`]: native tool calls through the guarded executor
//! - [`BaselineTreatment`]: raw HTTP requests written as JSON text, sent once
//!
//! # Example
//!
//! ```rust,no_run
//! use guardrail_core::eval::{EvaluationHarness, EvaluationTask, ToolCallingTreatment};
//! use guardrail_core::executor::GuardedExecutor;
//! # use guardrail_core::llm::ChatClient;
//! # use std::sync::Arc;
//!
//! # async fn run(client: Arc<dyn ChatClient>, executor: GuardedExecutor) {
//! let mut harness = EvaluationHarness::default();
//! harness
//!     .register_treatment("tool-calling", ToolCallingTreatment::new(client, executor))
//!     .add_task(EvaluationTask::new(
//!         "count-items",
//!         "How many items are in the inventory?",
//!         |result| result.as_u64() == Some(3),
//!     ));
//!
//! let report = harness.run().await;
//! println!("{}", report.to_markdown());
//! # }
//! ```

mod expectation;
mod harness;
mod report;
mod run;
mod select;
mod task;
mod treatment;
mod treatments;

pub use expectation::{
    CheckOperator, JsonPathCheck, TaskExpectation, TaskSpec, get_json_path, load_tasks,
    parse_task_specs,
};
pub use harness::EvaluationHarness;
pub use report::{EvaluationReport, TaskInfo, TreatmentSummary};
pub use run::{CallMetrics, EvaluationRun, TokenCounts};
pub use select::{AllTools, KeywordToolSelector, ToolSelector};
pub use task::{EvaluationTask, SuccessPredicate};
pub use treatment::{Treatment, TreatmentOutput};
pub use treatments::{BaselineTreatment, ToolCallingTreatment};

#[cfg(test)]
mod tests;
