//! Guarded executor
//!
//! One logical call runs through
//! `VALIDATING -> BUILDING -> SENDING -> (SUCCESS | CLASSIFYING -> (RETRY_WAIT -> SENDING) | FAILED)`.
//! Local failures never reach the transport. Each attempt is bounded by the
//! resolved timeout; the retry sequence as a whole is not. Every terminal
//! outcome appends exactly one [`ExecutionRecord`] when metrics are enabled.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::classifier::{ClassifiedError, classify, classify_transport};
use super::rate_limit::RateLimiter;
use super::request::{ExecutionContext, HttpRequest, build_request};
use super::retry::{RetrySchedule, RetryState};
use super::transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
use crate::document::{Operation, OperationSet};
use crate::error::{GuardrailError, Result};
use crate::metrics::{ExecutionRecord, SessionMetrics};
use crate::schema::{CompiledValidator, SchemaValidator, SchemaViolation};

/// Successful call result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    /// Parsed response body; opaque text when the body is not JSON
    pub data: Value,
    /// Final HTTP status
    pub status: u16,
    /// Retries spent
    pub retries: u32,
    /// Wall time including retry waits
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Output schema violations (advisory)
    pub warnings: Vec<SchemaViolation>,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Builder for [`GuardedExecutor`]
pub struct GuardedExecutorBuilder {
    operations: Arc<OperationSet>,
    context: ExecutionContext,
    transport: Option<Arc<dyn HttpTransport>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    metrics_enabled: bool,
}

impl GuardedExecutorBuilder {
    /// Transport to send requests through (defaults to `reqwest`)
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Schema validator (defaults to [`CompiledValidator`])
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Enable or disable record keeping
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn build(self) -> GuardedExecutor {
        GuardedExecutor {
            operations: self.operations,
            context: self.context,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(CompiledValidator::new())),
            metrics: self.metrics_enabled.then(SessionMetrics::new),
            rate_limiter: RateLimiter::new(),
        }
    }
}

/// Executes operations under their declared guardrails
///
/// An executor owns its metrics. Run one executor per concurrent caller.
pub struct GuardedExecutor {
    operations: Arc<OperationSet>,
    context: ExecutionContext,
    transport: Arc<dyn HttpTransport>,
    validator: Arc<dyn SchemaValidator>,
    metrics: Option<SessionMetrics>,
    rate_limiter: RateLimiter,
}

impl std::fmt::Debug for GuardedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedExecutor")
            .field("base_url", &self.context.base_url)
            .field("operations", &self.operations.len())
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

/// How one send attempt ended, short of success
enum AttemptFailure {
    Http(ClassifiedError),
    Transport(ClassifiedError),
}

impl AttemptFailure {
    fn classified(&self) -> &ClassifiedError {
        match self {
            AttemptFailure::Http(e) | AttemptFailure::Transport(e) => e,
        }
    }
}

impl GuardedExecutor {
    /// Start building an executor for `operations` under `context`
    pub fn builder(
        operations: impl Into<Arc<OperationSet>>,
        context: ExecutionContext,
    ) -> GuardedExecutorBuilder {
        GuardedExecutorBuilder {
            operations: operations.into(),
            context,
            transport: None,
            validator: None,
            metrics_enabled: true,
        }
    }

    /// Operations this executor can call
    pub fn operations(&self) -> &OperationSet {
        &self.operations
    }

    /// Resolved execution context
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Session metrics, when enabled
    pub fn metrics(&self) -> Option<&SessionMetrics> {
        self.metrics.as_ref()
    }

    /// Metrics table; header only when metrics are disabled
    pub fn export_metrics_table(&self) -> String {
        match &self.metrics {
            Some(metrics) => metrics.to_table(),
            None => SessionMetrics::new().to_table(),
        }
    }

    /// Clear recorded metrics
    pub fn reset_metrics(&mut self) {
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.reset();
        }
    }

    /// Execute `op_id` with `args`
    ///
    /// Returns the parsed body on 2xx. Failures carry the classified payload
    /// (status, code, retryable) so callers can branch on them.
    pub async fn call(&mut self, op_id: &str, args: Value) -> Result<CallOutcome> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let operations = Arc::clone(&self.operations);
        let Some(operation) = operations.get(op_id) else {
            let err = GuardrailError::UnknownOperation(op_id.to_string());
            self.record_failure(op_id, started_at, None, &err);
            return Err(err);
        };

        // VALIDATING
        let report = self.validator.validate(&operation.input_schema, &args);
        if !report.valid {
            let err = GuardrailError::InvalidInput {
                operation: op_id.to_string(),
                violations: report.errors,
            };
            self.record_failure(op_id, started_at, None, &err);
            return Err(err);
        }

        // BUILDING
        let request = match build_request(&self.context, operation, &args) {
            Ok(request) => request,
            Err(err) => {
                self.record_failure(op_id, started_at, None, &err);
                return Err(err);
            }
        };

        let mut state = RetryState::new(RetrySchedule::from_policy(operation.retry_policy()));
        loop {
            tracing::debug!(
                operation = op_id,
                attempt = state.attempt(),
                method = %request.method,
                url = %request.url,
                "Sending request"
            );

            // SENDING
            let failure = match self.attempt(operation, &request).await {
                Ok(response) => {
                    let outcome = self.complete(operation, response, state.retries(), clock);
                    self.record(ExecutionRecord::success(
                        op_id,
                        started_at,
                        Utc::now(),
                        outcome.status,
                        outcome.retries,
                    ));
                    tracing::info!(
                        operation = op_id,
                        status = outcome.status,
                        retries = outcome.retries,
                        "Call succeeded"
                    );
                    return Ok(outcome);
                }
                Err(failure) => failure,
            };

            // CLASSIFYING
            let classified = failure.classified();
            if !classified.retryable || !state.can_retry() {
                let err = self.terminal_error(op_id, failure, state.retries());
                tracing::info!(
                    operation = op_id,
                    code = err.code(),
                    status = ?err.status(),
                    retries = state.retries(),
                    previous_error = state.last_error(),
                    "Call failed"
                );
                self.record_failure(op_id, started_at, err.status(), &err);
                return Err(err);
            }

            // RETRY_WAIT
            let delay = state.begin_retry(classified.to_string());
            tracing::warn!(
                operation = op_id,
                error = %classified,
                retry = state.retries(),
                remaining = state.remaining(),
                ?delay,
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &mut self,
        operation: &Operation,
        request: &HttpRequest,
    ) -> std::result::Result<HttpResponse, AttemptFailure> {
        if let Some(limit) = operation
            .guardrails
            .as_ref()
            .and_then(|g| g.rate_limit.as_ref())
        {
            self.rate_limiter.acquire(&operation.id, limit).await;
        }

        let sent = tokio::time::timeout(request.timeout, self.transport.send(request)).await;
        match sent {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(AttemptFailure::Http(classify(
                operation,
                response.status,
                &response.body,
            ))),
            Ok(Err(error)) => Err(AttemptFailure::Transport(classify_transport(&error))),
            Err(_) => Err(AttemptFailure::Transport(classify_transport(
                &TransportError::Timeout(request.timeout),
            ))),
        }
    }

    fn complete(
        &self,
        operation: &Operation,
        response: HttpResponse,
        retries: u32,
        clock: Instant,
    ) -> CallOutcome {
        let data = parse_body(&operation.id, response.body);

        let mut warnings = Vec::new();
        if let Some(schema) = &operation.output_schema {
            let report = self.validator.validate(schema, &data);
            if !report.valid {
                for violation in &report.errors {
                    tracing::warn!(
                        operation = %operation.id,
                        path = %violation.path,
                        "Response does not match output schema: {}",
                        violation.message
                    );
                }
                warnings = report.errors;
            }
        }

        CallOutcome {
            data,
            status: response.status,
            retries,
            duration: clock.elapsed(),
            warnings,
        }
    }

    fn terminal_error(&self, op_id: &str, failure: AttemptFailure, retries: u32) -> GuardrailError {
        match failure {
            AttemptFailure::Http(error) => GuardrailError::Http {
                operation: op_id.to_string(),
                retries,
                error,
            },
            AttemptFailure::Transport(error) => GuardrailError::Transport {
                operation: op_id.to_string(),
                retries,
                error,
            },
        }
    }

    fn record(&mut self, record: ExecutionRecord) {
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.record(record);
        }
    }

    fn record_failure(
        &mut self,
        op_id: &str,
        started_at: DateTime<Utc>,
        status: Option<u16>,
        err: &GuardrailError,
    ) {
        let message = err
            .classified()
            .map(|c| c.message.clone())
            .unwrap_or_else(|| err.to_string());
        self.record(ExecutionRecord::failure(
            op_id,
            started_at,
            Utc::now(),
            status,
            err.retries(),
            err.code(),
            message,
        ));
    }
}

/// Parse a 2xx body; empty is null, non-JSON is kept as opaque text
fn parse_body(op_id: &str, body: String) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(operation = op_id, error = %e, "Response body is not JSON");
            Value::String(body)
        }
    }
}
