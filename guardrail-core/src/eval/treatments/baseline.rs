//! Raw HTTP baseline
//!
//! The model reads a plain listing of the operations and asks for requests
//! as JSON text. Each request is sent exactly once through the bare
//! transport: no input validation, no retry and no error classification.
//! Whatever the model gets wrong stays wrong, which is what the guarded
//! treatment is measured against.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use super::truncate_chars;
use crate::config::HarnessConfig;
use crate::document::{HttpMethod, OperationSet};
use crate::error::{GuardrailError, Result};
use crate::eval::run::{CallMetrics, TokenCounts};
use crate::eval::task::EvaluationTask;
use crate::eval::treatment::{Treatment, TreatmentOutput};
use crate::executor::{ExecutionContext, HttpRequest, HttpTransport, TransportError};
use crate::llm::{ChatClient, ChatMessage};
use crate::parsing::{JsonResultExtractor, ResultExtractor};

const PROTOCOL: &str = "To make a request, reply with JSON only: \
{\"method\": \"GET\", \"path\": \"/items/1\", \"body\": {...}}. The body is optional. \
You will receive the HTTP status and response body. When you are done, reply with \
{\"answer\": <final answer as JSON>}.";

/// Model issues raw HTTP requests described in plain text
pub struct BaselineTreatment {
    client: Arc<dyn ChatClient>,
    transport: Arc<dyn HttpTransport>,
    operations: Arc<OperationSet>,
    context: ExecutionContext,
    extractor: Box<dyn ResultExtractor>,
    max_turns: usize,
    max_response_chars: usize,
}

impl std::fmt::Debug for BaselineTreatment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineTreatment")
            .field("model", &self.client.model_info())
            .field("base_url", &self.context.base_url)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

/// What one model reply asked for
#[derive(Debug, PartialEq)]
enum Reply {
    Request {
        method: HttpMethod,
        path: String,
        body: Option<Value>,
    },
    Answer(Value),
    Invalid(String),
}

impl BaselineTreatment {
    pub fn new(
        client: Arc<dyn ChatClient>,
        transport: Arc<dyn HttpTransport>,
        operations: impl Into<Arc<OperationSet>>,
        context: ExecutionContext,
    ) -> Self {
        let defaults = HarnessConfig::default();
        Self {
            client,
            transport,
            operations: operations.into(),
            context,
            extractor: Box::new(JsonResultExtractor::new()),
            max_turns: defaults.max_turns,
            max_response_chars: defaults.max_tool_result_chars,
        }
    }

    pub fn with_config(mut self, config: &HarnessConfig) -> Self {
        self.max_turns = config.max_turns.max(1);
        self.max_response_chars = config.max_tool_result_chars;
        self
    }

    pub fn with_extractor(mut self, extractor: impl ResultExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// System prompt: operation listing plus the reply protocol
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "You are calling an HTTP API at {}. Available endpoints:\n",
            self.context.base_url
        );
        for op in self.operations.iter() {
            let summary = op
                .summary
                .as_deref()
                .or(op.description.as_deref())
                .unwrap_or(&op.id);
            let _ = writeln!(prompt, "- {} {} - {}", op.method, op.path, summary);
        }
        prompt.push('\n');
        prompt.push_str(PROTOCOL);
        prompt
    }

    fn interpret(&self, text: &str) -> Reply {
        let value = match self.extractor.extract(text) {
            Ok(value) => value,
            Err(failure) => return Reply::Invalid(format!("reply is not JSON: {}", failure)),
        };

        let Value::Object(map) = &value else {
            return Reply::Answer(value);
        };

        if let Some(answer) = map.get("answer") {
            return Reply::Answer(answer.clone());
        }

        match (map.get("method"), map.get("path")) {
            (Some(Value::String(method)), Some(Value::String(path))) => {
                match method.parse::<HttpMethod>() {
                    Ok(method) => Reply::Request {
                        method,
                        path: path.clone(),
                        body: map.get("body").filter(|b| !b.is_null()).cloned(),
                    },
                    Err(reason) => Reply::Invalid(reason),
                }
            }
            (Some(_), _) | (_, Some(_)) => {
                Reply::Invalid("a request needs string \"method\" and \"path\" fields".to_string())
            }
            _ => Reply::Answer(value),
        }
    }

    /// Send once; returns the text fed back to the model
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        calls: &mut CallMetrics,
    ) -> String {
        let separator = if path.starts_with('/') { "" } else { "/" };
        let request = HttpRequest {
            method,
            url: format!(
                "{}{}{}",
                self.context.base_url.trim_end_matches('/'),
                separator,
                path
            ),
            headers: self.context.headers_with(&BTreeMap::new()),
            body: body.map(|b| b.to_string()),
            timeout: self.context.default_timeout,
        };

        calls.http_calls += 1;
        tracing::debug!(method = %method, url = %request.url, "Baseline request");

        let response = match tokio::time::timeout(request.timeout, self.transport.send(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(request.timeout)),
        };

        match response {
            Ok(response) => {
                if !response.is_success() {
                    calls.http_errors += 1;
                }
                truncate_chars(
                    format!("HTTP {}\n{}", response.status, response.body),
                    self.max_response_chars,
                )
            }
            Err(err) => {
                calls.http_errors += 1;
                format!("Request failed: {}", err)
            }
        }
    }
}

#[async_trait]
impl Treatment for BaselineTreatment {
    async fn execute_task(&mut self, task: &EvaluationTask) -> Result<TreatmentOutput> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(task.prompt.clone()),
        ];
        let mut tokens = TokenCounts::default();
        let mut calls = CallMetrics::default();

        for turn in 0..self.max_turns {
            let reply = self.client.chat(&messages, None).await?;
            if let Some(usage) = &reply.usage {
                tokens.add_usage(usage);
            }
            let text = reply.content.clone().unwrap_or_default();
            messages.push(ChatMessage::assistant(&reply));

            let feedback = match self.interpret(&text) {
                Reply::Answer(result) => {
                    tracing::debug!(task = %task.id, turns = turn + 1, "Final answer received");
                    return Ok(TreatmentOutput::new(result)
                        .with_tokens(tokens)
                        .with_calls(calls));
                }
                Reply::Invalid(reason) => {
                    calls.invalid_calls += 1;
                    tracing::debug!(task = %task.id, %reason, "Malformed baseline reply");
                    format!("Invalid reply: {}. {}", reason, PROTOCOL)
                }
                Reply::Request { method, path, body } => {
                    self.send(method, &path, body, &mut calls).await
                }
            };
            messages.push(ChatMessage::user(feedback));
        }

        Err(GuardrailError::Other(format!(
            "no final answer after {} turns",
            self.max_turns
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Operation;
    use crate::llm::ScriptedChatClient;
    use crate::executor::StubTransport;

    fn treatment() -> BaselineTreatment {
        let operations = OperationSet::new(vec![
            Operation::new("getItem", HttpMethod::Get, "/items/{id}").with_summary("Fetch an item"),
        ])
        .unwrap();
        BaselineTreatment::new(
            Arc::new(ScriptedChatClient::new(Vec::new())),
            Arc::new(StubTransport::default()),
            operations,
            ExecutionContext::new("http://api.test"),
        )
    }

    #[test]
    fn test_system_prompt_lists_operations() {
        let prompt = treatment().system_prompt();
        assert!(prompt.contains("http://api.test"));
        assert!(prompt.contains("- GET /items/{id} - Fetch an item"));
        assert!(prompt.contains("\"answer\""));
    }

    #[test]
    fn test_interpret_request() {
        let reply = treatment().interpret(r#"{"method": "get", "path": "/items/1"}"#);
        assert_eq!(
            reply,
            Reply::Request {
                method: HttpMethod::Get,
                path: "/items/1".to_string(),
                body: None,
            }
        );
    }

    #[test]
    fn test_interpret_answer() {
        assert_eq!(
            treatment().interpret(r#"{"answer": [1, 2]}"#),
            Reply::Answer(serde_json::json!([1, 2]))
        );
        assert_eq!(
            treatment().interpret("```json\n{\"count\": 3}\n```"),
            Reply::Answer(serde_json::json!({"count": 3}))
        );
    }

    #[test]
    fn test_interpret_invalid() {
        let t = treatment();
        assert!(matches!(t.interpret("no idea"), Reply::Invalid(_)));
        assert!(matches!(
            t.interpret(r#"{"method": "TRACE", "path": "/"}"#),
            Reply::Invalid(_)
        ));
        assert!(matches!(t.interpret(r#"{"method": "GET"}"#), Reply::Invalid(_)));
    }
}
