//! # Guardrail - Guarded Execution for Model-Driven API Calls
//!
//! Guardrail executes HTTP operations described declaratively in an
//! operation document, on behalf of a language model:
//! - Input validation against each operation's JSON Schema
//! - Retry with backoff for transient failures, per operation policy
//! - Classification of failures into structured, actionable errors
//! - Per-call metrics for the whole session
//!
//! An evaluation harness measures how much the guardrails help, by running
//! the same natural-language tasks through native tool calling over the
//! guarded executor and through a raw-HTTP baseline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardrail_core::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let operations = OperationSet::load("api.yaml")?;
//!     let context = ExecutionContext::for_operations(None, &operations)?;
//!     let mut executor = GuardedExecutor::builder(operations, context).build();
//!
//!     match executor.call("getItem", json!({"id": 42})).await {
//!         Ok(outcome) => println!("{}", outcome.data),
//!         Err(err) => println!("{} (retryable: {})", err.code(), err.is_retryable()),
//!     }
//!     print!("{}", executor.export_metrics_table());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **document**: the operation document model and its loaders
//! - **executor**: the guarded call pipeline and its transport seam
//! - **manifest**: operations exposed as model tool definitions
//! - **eval**: tasks, treatments, the harness and its reports
//! - **llm**: chat clients for OpenAI-compatible providers

pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod executor;
pub mod llm;
pub mod manifest;
pub mod metrics;
pub mod parsing;
pub mod schema;

pub use error::{GuardrailError, Result};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        ExecutorConfig, GuardrailConfig, HarnessConfig, LlmProvider, LlmProviderConfig,
    };
    pub use crate::document::{
        ErrorPattern, GuardrailPolicy, HttpMethod, Operation, OperationSet, RateLimit,
        RetryPolicy, RetryStrategy, SideEffect,
    };
    pub use crate::error::{GuardrailError, Result};
    pub use crate::eval::{
        BaselineTreatment, EvaluationHarness, EvaluationReport, EvaluationRun, EvaluationTask,
        KeywordToolSelector, ToolCallingTreatment, ToolSelector, Treatment, TreatmentOutput,
        TreatmentSummary, load_tasks,
    };
    pub use crate::executor::{
        CallOutcome, ClassifiedError, ExecutionContext, GuardedExecutor, HttpTransport,
        ReqwestTransport, StubExchange, StubTransport,
    };
    pub use crate::llm::{
        AssistantMessage, ChatClient, ChatMessage, OpenAiCompatibleClient, ScriptedChatClient,
        ToolDefinition, client_from_config,
    };
    pub use crate::manifest::{ToolManifest, build_manifest};
    pub use crate::metrics::{ExecutionRecord, MetricsSummary, SessionMetrics};
    pub use crate::parsing::{JsonResultExtractor, ResultExtractor};
    pub use crate::schema::{CompiledValidator, SchemaValidator};
}
