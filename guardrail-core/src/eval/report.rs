//! Aggregate evaluation report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use super::run::EvaluationRun;
use super::task::EvaluationTask;
use crate::error::Result;

/// Task as listed in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub prompt: String,
}

/// Per-treatment aggregate over all of its runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreatmentSummary {
    pub treatment: String,
    pub runs: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub avg_input_tokens: f64,
    pub avg_output_tokens: f64,
    pub avg_total_tokens: f64,
    pub total_http_calls: u64,
    pub total_invalid_calls: u64,
    pub total_retries: u64,
    pub total_http_errors: u64,
}

impl TreatmentSummary {
    fn fold<'a>(treatment: &str, runs: impl Iterator<Item = &'a EvaluationRun>) -> Self {
        let mut summary = Self {
            treatment: treatment.to_string(),
            ..Default::default()
        };
        let (mut duration, mut input, mut output, mut total) = (0u64, 0u64, 0u64, 0u64);

        for run in runs {
            summary.runs += 1;
            if run.success {
                summary.successes += 1;
            }
            duration += run.duration_ms;
            input += run.tokens.input;
            output += run.tokens.output;
            total += run.tokens.total;
            summary.total_http_calls += u64::from(run.calls.http_calls);
            summary.total_invalid_calls += u64::from(run.calls.invalid_calls);
            summary.total_retries += u64::from(run.calls.retries);
            summary.total_http_errors += u64::from(run.calls.http_errors);
        }

        if summary.runs > 0 {
            let n = summary.runs as f64;
            summary.success_rate = summary.successes as f64 / n;
            summary.avg_duration_ms = duration as f64 / n;
            summary.avg_input_tokens = input as f64 / n;
            summary.avg_output_tokens = output as f64 / n;
            summary.avg_total_tokens = total as f64 / n;
        }
        summary
    }
}

/// All runs of one harness pass plus per-treatment summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<TaskInfo>,
    pub treatments: Vec<String>,
    pub runs: Vec<EvaluationRun>,
    pub summaries: Vec<TreatmentSummary>,
}

impl EvaluationReport {
    /// Fold `runs` into a report; summaries follow `treatments` order
    pub fn new(tasks: &[EvaluationTask], treatments: Vec<String>, runs: Vec<EvaluationRun>) -> Self {
        let summaries = treatments
            .iter()
            .map(|name| TreatmentSummary::fold(name, runs.iter().filter(|r| &r.treatment == name)))
            .collect();

        Self {
            generated_at: Utc::now(),
            tasks: tasks
                .iter()
                .map(|t| TaskInfo {
                    id: t.id.clone(),
                    prompt: t.prompt.clone(),
                })
                .collect(),
            treatments,
            runs,
            summaries,
        }
    }

    pub fn summary_for(&self, treatment: &str) -> Option<&TreatmentSummary> {
        self.summaries.iter().find(|s| s.treatment == treatment)
    }

    pub fn runs_for<'a>(&'a self, treatment: &'a str) -> impl Iterator<Item = &'a EvaluationRun> {
        self.runs.iter().filter(move |r| r.treatment == treatment)
    }

    pub fn run(&self, task_id: &str, treatment: &str) -> Option<&EvaluationRun> {
        self.runs
            .iter()
            .find(|r| r.task_id == task_id && r.treatment == treatment)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Markdown summary table followed by per-task results
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Evaluation Report\n");
        let _ = writeln!(
            out,
            "Generated {} over {} task(s) and {} treatment(s).\n",
            self.generated_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.tasks.len(),
            self.treatments.len()
        );

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(
            out,
            "| Treatment | Success rate | Avg duration (ms) | Avg tokens (in/out/total) | HTTP calls | Invalid calls | Retries | HTTP errors |"
        );
        let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
        for s in &self.summaries {
            let _ = writeln!(
                out,
                "| {} | {:.1}% ({}/{}) | {:.0} | {:.0} / {:.0} / {:.0} | {} | {} | {} | {} |",
                escape_cell(&s.treatment),
                s.success_rate * 100.0,
                s.successes,
                s.runs,
                s.avg_duration_ms,
                s.avg_input_tokens,
                s.avg_output_tokens,
                s.avg_total_tokens,
                s.total_http_calls,
                s.total_invalid_calls,
                s.total_retries,
                s.total_http_errors
            );
        }

        let _ = writeln!(out, "\n## Runs\n");
        let _ = writeln!(out, "| Task | Treatment | Success | Duration (ms) | Tokens | Error |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        for run in &self.runs {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                escape_cell(&run.task_id),
                escape_cell(&run.treatment),
                if run.success { "yes" } else { "no" },
                run.duration_ms,
                run.tokens.total,
                run.error.as_deref().map(escape_cell).unwrap_or_default()
            );
        }
        out
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
