//! Structured tool calling through the guarded executor

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::truncate_chars;
use crate::config::HarnessConfig;
use crate::error::{GuardrailError, Result};
use crate::eval::run::{CallMetrics, TokenCounts};
use crate::eval::select::{AllTools, KeywordToolSelector, ToolSelector};
use crate::eval::task::EvaluationTask;
use crate::eval::treatment::{Treatment, TreatmentOutput};
use crate::executor::GuardedExecutor;
use crate::llm::{ChatClient, ChatMessage, ToolInvocation};
use crate::manifest::{ToolManifest, build_manifest};
use crate::parsing::{JsonResultExtractor, ResultExtractor};

const SYSTEM_PROMPT: &str = "You are operating an HTTP API through the provided tools. \
Call tools to gather what you need. Tool results are JSON; failed calls carry an error \
code and whether retrying could help. When you are done, reply with the final answer as \
JSON only, with no surrounding prose.";

/// Model drives the API with native tool calls; every call goes through
/// the guarded executor (validation, retry, classification)
pub struct ToolCallingTreatment {
    client: Arc<dyn ChatClient>,
    executor: GuardedExecutor,
    manifest: ToolManifest,
    selector: Box<dyn ToolSelector>,
    extractor: Box<dyn ResultExtractor>,
    max_turns: usize,
    max_tool_result_chars: usize,
    system_prompt: String,
}

impl std::fmt::Debug for ToolCallingTreatment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallingTreatment")
            .field("model", &self.client.model_info())
            .field("tools", &self.manifest.len())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl ToolCallingTreatment {
    pub fn new(client: Arc<dyn ChatClient>, executor: GuardedExecutor) -> Self {
        let manifest = build_manifest(executor.operations());
        let defaults = HarnessConfig::default();
        Self {
            client,
            executor,
            manifest,
            selector: Box::new(AllTools),
            extractor: Box::new(JsonResultExtractor::new()),
            max_turns: defaults.max_turns,
            max_tool_result_chars: defaults.max_tool_result_chars,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Apply turn, tool-count and truncation limits from configuration
    pub fn with_config(mut self, config: &HarnessConfig) -> Self {
        self.max_turns = config.max_turns.max(1);
        self.max_tool_result_chars = config.max_tool_result_chars;
        if let Some(max_tools) = config.max_tools {
            self.selector = Box::new(KeywordToolSelector::new(max_tools));
        }
        self
    }

    pub fn with_selector(mut self, selector: impl ToolSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_extractor(mut self, extractor: impl ResultExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn executor(&self) -> &GuardedExecutor {
        &self.executor
    }

    /// Resolve and execute one invocation; returns the text fed back to the model
    async fn invoke(&mut self, call: &ToolInvocation, calls: &mut CallMetrics) -> String {
        let resolved = match self.manifest.resolve(call) {
            Ok(resolved) => resolved,
            Err(err) => {
                calls.invalid_calls += 1;
                tracing::debug!(tool = %call.name, error = %err, "Unresolvable tool call");
                return error_payload(&err).to_string();
            }
        };

        let payload = match self.executor.call(&resolved.op_id, resolved.args).await {
            Ok(outcome) => {
                calls.http_calls += outcome.retries + 1;
                calls.retries += outcome.retries;
                json!({"status": outcome.status, "data": outcome.data})
            }
            Err(err) if err.is_local() => {
                calls.invalid_calls += 1;
                error_payload(&err)
            }
            Err(err) => {
                calls.http_calls += err.retries() + 1;
                calls.retries += err.retries();
                calls.http_errors += 1;
                error_payload(&err)
            }
        };

        truncate_chars(payload.to_string(), self.max_tool_result_chars)
    }
}

#[async_trait]
impl Treatment for ToolCallingTreatment {
    async fn execute_task(&mut self, task: &EvaluationTask) -> Result<TreatmentOutput> {
        let tools = self.selector.select(task, self.manifest.tools());
        tracing::debug!(task = %task.id, tools = tools.len(), "Offering tools");

        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(task.prompt.clone()),
        ];
        let mut tokens = TokenCounts::default();
        let mut calls = CallMetrics::default();

        for turn in 0..self.max_turns {
            let reply = self.client.chat(&messages, Some(tools.as_slice())).await?;
            if let Some(usage) = &reply.usage {
                tokens.add_usage(usage);
            }

            if !reply.has_tool_calls() {
                let text = reply.content.unwrap_or_default();
                let result = match self.extractor.extract(&text) {
                    Ok(value) => value,
                    Err(failure) => {
                        tracing::debug!(task = %task.id, %failure, "Final answer is not JSON");
                        Value::String(text)
                    }
                };
                tracing::debug!(task = %task.id, turns = turn + 1, "Final answer received");
                return Ok(TreatmentOutput::new(result)
                    .with_tokens(tokens)
                    .with_calls(calls));
            }

            messages.push(ChatMessage::assistant(&reply));
            for call in &reply.tool_calls {
                let content = self.invoke(call, &mut calls).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }

        Err(GuardrailError::Other(format!(
            "no final answer after {} turns",
            self.max_turns
        )))
    }
}

/// Structured error the model can reason about
fn error_payload(err: &GuardrailError) -> Value {
    let mut error = json!({
        "code": err.code(),
        "message": err.to_string(),
        "retryable": err.is_retryable(),
    });
    if let Some(classified) = err.classified() {
        error["status"] = json!(classified.status);
        if let Some(hint) = &classified.recovery_hint {
            error["recoveryHint"] = json!(hint);
        }
    }
    json!({ "error": error })
}
