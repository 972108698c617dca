//! Guarded operation execution
//!
//! Validation, request construction, retry with backoff, error
//! classification and metrics capture for calls described by an
//! [`OperationSet`](crate::document::OperationSet).
//!
//! # Example
//!
//! ```rust,no_run
//! use guardrail_core::document::OperationSet;
//! use guardrail_core::executor::{ExecutionContext, GuardedExecutor};
//! use serde_json::json;
//!
//! # async fn run() -> guardrail_core::error::Result<()> {
//! let operations = OperationSet::load("api.yaml")?;
//! let context = ExecutionContext::for_operations(None, &operations)?;
//! let mut executor = GuardedExecutor::builder(operations, context).build();
//!
//! let outcome = executor.call("getItem", json!({"id": 42})).await?;
//! println!("{} -> {}", outcome.status, outcome.data);
//! print!("{}", executor.export_metrics_table());
//! # Ok(())
//! # }
//! ```

mod classifier;
mod guarded;
mod rate_limit;
mod request;
mod retry;
mod stub;
mod transport;

pub use classifier::{ClassifiedError, classify, classify_transport, is_retryable_status};
pub use guarded::{CallOutcome, GuardedExecutor, GuardedExecutorBuilder};
pub use rate_limit::RateLimiter;
pub use request::{DEFAULT_TIMEOUT, ExecutionContext, HttpRequest, build_request};
pub use retry::{RetrySchedule, RetryState};
pub use stub::{StubExchange, StubTransport};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
