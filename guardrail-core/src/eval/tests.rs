//! Harness and treatment behaviour with scripted models and transports

use super::*;
use crate::config::HarnessConfig;
use crate::document::{GuardrailPolicy, HttpMethod, Operation, OperationSet, RetryPolicy};
use crate::error::{GuardrailError, Result};
use crate::executor::{ExecutionContext, GuardedExecutor, StubExchange, StubTransport};
use crate::llm::{AssistantMessage, ChatRole, ScriptedChatClient, TokenUsage, ToolInvocation};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Returns `answer` for every task
struct FixedTreatment {
    answer: Value,
}

#[async_trait]
impl Treatment for FixedTreatment {
    async fn execute_task(&mut self, _task: &EvaluationTask) -> Result<TreatmentOutput> {
        Ok(TreatmentOutput::new(self.answer.clone()).with_calls(CallMetrics {
            http_calls: 1,
            ..Default::default()
        }))
    }
}

/// Fails the task named `failing_task`, answers `answer` otherwise
struct FlakyTreatment {
    failing_task: &'static str,
    answer: Value,
}

#[async_trait]
impl Treatment for FlakyTreatment {
    async fn execute_task(&mut self, task: &EvaluationTask) -> Result<TreatmentOutput> {
        if task.id == self.failing_task {
            return Err(GuardrailError::Other("boom".to_string()));
        }
        Ok(TreatmentOutput::new(self.answer.clone()))
    }
}

struct SlowTreatment;

#[async_trait]
impl Treatment for SlowTreatment {
    async fn execute_task(&mut self, _task: &EvaluationTask) -> Result<TreatmentOutput> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(TreatmentOutput::new(json!(42)))
    }
}

struct PanickingTreatment;

#[async_trait]
impl Treatment for PanickingTreatment {
    async fn execute_task(&mut self, _task: &EvaluationTask) -> Result<TreatmentOutput> {
        panic!("model went sideways");
    }
}

fn answer_is_42(id: &str) -> EvaluationTask {
    EvaluationTask::new(id, "What is the answer?", |v| v == &json!(42))
}

#[tokio::test]
async fn test_success_rates_per_treatment() {
    let three_items = |id: &str| {
        EvaluationTask::new(id, "List the items", |v| {
            v.as_array().is_some_and(|items| items.len() == 3)
        })
    };
    let mut harness = EvaluationHarness::default();
    harness
        .register_treatment("right", FixedTreatment { answer: json!([1, 2, 3]) })
        .register_treatment("wrong", FixedTreatment { answer: json!([1, 2]) })
        .add_tasks(["a", "b", "c"].map(three_items));

    let report = harness.run().await;

    assert_eq!(report.runs.len(), 6);
    assert_eq!(report.treatments, vec!["right", "wrong"]);

    let right = report.summary_for("right").unwrap();
    assert_eq!(right.runs, 3);
    assert_eq!(right.successes, 3);
    assert_eq!(right.success_rate, 1.0);
    assert_eq!(right.total_http_calls, 3);

    assert_eq!(report.runs_for("right").count(), 3);

    let wrong = report.summary_for("wrong").unwrap();
    assert_eq!(wrong.successes, 0);
    assert_eq!(wrong.success_rate, 0.0);

    // task-major order
    let order: Vec<(&str, &str)> = report
        .runs
        .iter()
        .map(|r| (r.task_id.as_str(), r.treatment.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("a", "right"),
            ("a", "wrong"),
            ("b", "right"),
            ("b", "wrong"),
            ("c", "right"),
            ("c", "wrong"),
        ]
    );
}

#[tokio::test]
async fn test_treatment_error_becomes_failed_run_and_pass_continues() {
    let mut harness = EvaluationHarness::default();
    harness
        .register_treatment(
            "flaky",
            FlakyTreatment {
                failing_task: "first",
                answer: json!(42),
            },
        )
        .add_task(answer_is_42("first"))
        .add_task(answer_is_42("second"));

    let report = harness.run().await;

    let failed = report.run("first", "flaky").unwrap();
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("boom"));
    assert!(failed.result.is_none());
    assert_eq!(failed.tokens, TokenCounts::default());

    let passed = report.run("second", "flaky").unwrap();
    assert!(passed.success);
    assert!(passed.error.is_none());
    assert_eq!(report.summary_for("flaky").unwrap().success_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_task_timeout() {
    let mut harness = EvaluationHarness::new(HarnessConfig {
        default_task_timeout: Duration::from_secs(30),
        ..Default::default()
    });
    harness
        .register_treatment("slow", SlowTreatment)
        .add_task(answer_is_42("default-timeout"))
        .add_task(answer_is_42("short").with_timeout(Duration::from_secs(1)));

    let report = harness.run().await;

    let run = report.run("default-timeout", "slow").unwrap();
    assert!(!run.success);
    assert_eq!(run.error.as_deref(), Some("task timed out after 30s"));

    let run = report.run("short", "slow").unwrap();
    assert_eq!(run.error.as_deref(), Some("task timed out after 1s"));
    assert!(run.duration_ms >= 1000);
}

#[tokio::test]
async fn test_panicking_treatment_is_contained() {
    let mut harness = EvaluationHarness::default();
    harness
        .register_treatment("panics", PanickingTreatment)
        .register_treatment("right", FixedTreatment { answer: json!(42) })
        .add_task(answer_is_42("t"));

    let report = harness.run().await;

    let run = report.run("t", "panics").unwrap();
    assert!(!run.success);
    assert_eq!(
        run.error.as_deref(),
        Some("treatment panicked: model went sideways")
    );
    assert!(report.run("t", "right").unwrap().success);
}

#[tokio::test]
async fn test_registering_same_name_replaces() {
    let mut harness = EvaluationHarness::default();
    harness
        .register_treatment("t", FixedTreatment { answer: json!(7) })
        .register_treatment("t", FixedTreatment { answer: json!(42) })
        .add_task(answer_is_42("x"));

    assert_eq!(harness.treatment_names(), vec!["t"]);
    let report = harness.run().await;
    assert_eq!(report.runs.len(), 1);
    assert!(report.runs[0].success);
}

#[tokio::test]
async fn test_empty_harness_reports_nothing() {
    let report = EvaluationHarness::default().run().await;
    assert!(report.runs.is_empty());
    assert!(report.summaries.is_empty());
}

fn inventory() -> OperationSet {
    let get_item = Operation::new("getItem", HttpMethod::Get, "/items/{id}")
        .with_summary("Fetch one inventory item by id")
        .with_input_schema(json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}}
        }))
        .with_guardrails(
            GuardrailPolicy::default()
                .with_retry(RetryPolicy::exponential(2, Duration::from_millis(100))),
        );
    let list_items =
        Operation::new("listItems", HttpMethod::Get, "/items").with_summary("List inventory items");

    OperationSet::new(vec![get_item, list_items]).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_tool_calling_treatment_counts_calls_and_tokens() {
    let client = Arc::new(ScriptedChatClient::new([
        AssistantMessage::tool_calls(vec![ToolInvocation::new(
            "call_1",
            "getItem",
            r#"{"id": 1}"#,
        )])
        .with_usage(TokenUsage::new(100, 10)),
        AssistantMessage::tool_calls(vec![
            ToolInvocation::new("call_2", "getItem", r#"{"id": "one"}"#),
            ToolInvocation::new("call_3", "deleteEverything", "{}"),
        ])
        .with_usage(TokenUsage::new(150, 12)),
        AssistantMessage::text("```json\n{\"name\": \"widget\"}\n```")
            .with_usage(TokenUsage::new(200, 8)),
    ]));
    let transport = Arc::new(StubTransport::new([
        StubExchange::text(503, "unavailable"),
        StubExchange::json(200, json!({"id": 1, "name": "widget"})),
    ]));
    let executor = GuardedExecutor::builder(inventory(), ExecutionContext::new("http://api.test"))
        .transport(transport.clone())
        .build();
    let mut treatment = ToolCallingTreatment::new(client.clone(), executor);

    let task = EvaluationTask::new("fetch", "What is item 1 called?", |v| {
        v["name"] == "widget"
    });
    let output = treatment.execute_task(&task).await.unwrap();

    assert_eq!(output.result, json!({"name": "widget"}));
    assert!(task.is_success(&output.result));
    assert_eq!(
        output.calls,
        CallMetrics {
            http_calls: 2,
            invalid_calls: 2,
            retries: 1,
            http_errors: 0,
        }
    );
    assert_eq!(
        output.tokens,
        TokenCounts {
            input: 450,
            output: 30,
            total: 480,
        }
    );
    assert_eq!(transport.call_count(), 2);
    assert_eq!(client.remaining(), 0);

    // unknown tools never reach the executor
    let metrics = treatment.executor().metrics().unwrap();
    assert_eq!(metrics.total_operations(), 2);
    assert_eq!(metrics.successful_operations(), 1);

    let requests = client.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[0].tool_names.as_deref(),
        Some(&["getItem".to_string(), "listItems".to_string()][..])
    );

    // second request carries the first tool result
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == ChatRole::Tool)
        .unwrap();
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    let payload: Value = serde_json::from_str(tool_message.content.as_deref().unwrap()).unwrap();
    assert_eq!(payload["status"], 200);
    assert_eq!(payload["data"]["name"], "widget");

    // invalid arguments and unknown tools come back as structured errors
    let errors: Vec<Value> = requests[2]
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::Tool)
        .skip(1)
        .map(|m| serde_json::from_str(m.content.as_deref().unwrap()).unwrap())
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["error"]["code"], "INVALID_INPUT");
    assert_eq!(errors[1]["error"]["code"], "UNKNOWN_OPERATION");
}

#[tokio::test]
async fn test_tool_calling_treatment_gives_up_after_max_turns() {
    let looping = AssistantMessage::tool_calls(vec![ToolInvocation::new("c", "listItems", "")]);
    let client = Arc::new(ScriptedChatClient::new(vec![looping; 5]));
    let transport = Arc::new(StubTransport::always(StubExchange::json(200, json!([]))));
    let executor = GuardedExecutor::builder(inventory(), ExecutionContext::new("http://api.test"))
        .transport(transport.clone())
        .build();
    let mut treatment = ToolCallingTreatment::new(client, executor).with_config(&HarnessConfig {
        max_turns: 2,
        ..Default::default()
    });

    let err = treatment
        .execute_task(&answer_is_42("loop"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "no final answer after 2 turns");
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_tool_calling_treatment_with_keyword_selection() {
    let client = Arc::new(ScriptedChatClient::new([AssistantMessage::text("[]")]));
    let executor = GuardedExecutor::builder(inventory(), ExecutionContext::new("http://api.test"))
        .transport(Arc::new(StubTransport::default()))
        .build();
    let mut treatment = ToolCallingTreatment::new(client.clone(), executor)
        .with_config(&HarnessConfig {
            max_tools: Some(1),
            ..Default::default()
        })
        .with_system_prompt("Answer with a JSON array.");

    let task = EvaluationTask::new("list", "List every inventory item", |v| v.is_array());
    let output = treatment.execute_task(&task).await.unwrap();

    assert!(task.is_success(&output.result));
    let requests = client.requests();
    let request = &requests[0];
    assert_eq!(
        request.tool_names.as_deref(),
        Some(&["listItems".to_string()][..])
    );
    assert_eq!(
        request.messages[0].content.as_deref(),
        Some("Answer with a JSON array.")
    );
}

#[tokio::test]
async fn test_baseline_treatment_sends_raw_requests_once() {
    let client = Arc::new(ScriptedChatClient::new([
        AssistantMessage::text(r#"{"method": "GET", "path": "/items/1"}"#)
            .with_usage(TokenUsage::new(50, 5)),
        AssistantMessage::text(r#"{"method": "GET", "path": "/items/one"}"#)
            .with_usage(TokenUsage::new(60, 5)),
        AssistantMessage::text("Let me think about that.").with_usage(TokenUsage::new(70, 5)),
        AssistantMessage::text(r#"{"answer": {"name": "widget"}}"#)
            .with_usage(TokenUsage::new(80, 5)),
    ]));
    let transport = Arc::new(StubTransport::new([
        StubExchange::json(200, json!({"id": 1, "name": "widget"})),
        StubExchange::text(503, "unavailable"),
    ]));
    let context = ExecutionContext::new("http://api.test/").with_auth_header("X-Api-Key", "k");
    let mut treatment =
        BaselineTreatment::new(client.clone(), transport.clone(), inventory(), context);

    let task = EvaluationTask::new("fetch", "What is item 1 called?", |v| {
        v["name"] == "widget"
    });
    let output = treatment.execute_task(&task).await.unwrap();

    assert!(task.is_success(&output.result));
    assert_eq!(
        output.calls,
        CallMetrics {
            http_calls: 2,
            invalid_calls: 1,
            retries: 0,
            http_errors: 1,
        }
    );
    assert_eq!(output.tokens.total, 280);

    // no retry on 503
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, "http://api.test/items/1");
    assert_eq!(requests[0].headers.get("X-Api-Key").map(String::as_str), Some("k"));

    let chats = client.requests();
    assert!(chats.iter().all(|r| r.tool_names.is_none()));
    let feedback = chats[1].messages.last().unwrap().content.clone().unwrap();
    assert!(feedback.starts_with("HTTP 200\n"));
    let feedback = chats[2].messages.last().unwrap().content.clone().unwrap();
    assert!(feedback.starts_with("HTTP 503\n"));
}

#[tokio::test]
async fn test_harness_compares_guarded_and_baseline() {
    let ops = Arc::new(inventory());
    let transport = Arc::new(StubTransport::always(StubExchange::json(
        200,
        json!([{"id": 1}, {"id": 2}, {"id": 3}]),
    )));

    let guarded_client = Arc::new(ScriptedChatClient::new([
        AssistantMessage::tool_calls(vec![ToolInvocation::new("c1", "listItems", "{}")]),
        AssistantMessage::text("3"),
    ]));
    let executor = GuardedExecutor::builder(ops.clone(), ExecutionContext::new("http://api.test"))
        .transport(transport.clone())
        .build();

    let baseline_client = Arc::new(ScriptedChatClient::new([AssistantMessage::text(
        r#"{"answer": 2}"#,
    )]));

    let mut harness = EvaluationHarness::default();
    harness
        .register_treatment(
            "tool-calling",
            ToolCallingTreatment::new(guarded_client, executor),
        )
        .register_treatment(
            "baseline",
            BaselineTreatment::new(
                baseline_client,
                transport,
                ops,
                ExecutionContext::new("http://api.test"),
            ),
        )
        .add_task(EvaluationTask::new("count", "How many items exist?", |v| {
            v.as_u64() == Some(3)
        }));

    let report = harness.run().await;

    assert_eq!(report.summary_for("tool-calling").unwrap().success_rate, 1.0);
    assert_eq!(report.summary_for("baseline").unwrap().success_rate, 0.0);
    assert_eq!(report.run("count", "baseline").unwrap().result, Some(json!(2)));

    let markdown = report.to_markdown();
    assert!(markdown.contains("| tool-calling | 100.0% (1/1) |"));
    assert!(markdown.contains("| baseline | 0.0% (0/1) |"));
    assert!(markdown.contains("| count | baseline | no |"));

    let parsed: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
    assert_eq!(parsed["summaries"][0]["treatment"], "tool-calling");
    assert_eq!(parsed["runs"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["tasks"][0]["id"], "count");
}

#[test]
fn test_markdown_escapes_cells() {
    let tasks = vec![answer_is_42("a|b")];
    let runs = vec![EvaluationRun {
        task_id: "a|b".to_string(),
        treatment: "t".to_string(),
        success: false,
        duration_ms: 5,
        tokens: TokenCounts::default(),
        calls: CallMetrics::default(),
        result: None,
        error: Some("line one\nline two".to_string()),
    }];
    let report = EvaluationReport::new(&tasks, vec!["t".to_string()], runs);

    let markdown = report.to_markdown();
    assert!(markdown.contains("| a\\|b | t | no | 5 | 0 | line one line two |"));
}
