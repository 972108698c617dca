//! Evaluation harness
//!
//! For each task, for each treatment in registration order, sequentially:
//! run the treatment under the task timeout, score its result with the
//! task predicate and keep an [`EvaluationRun`]. Failures of any kind
//! (error, timeout, panic) become zero-success runs and the pass continues.
//! Aggregation happens once, after every combination has run.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

use super::report::EvaluationReport;
use super::run::EvaluationRun;
use super::task::EvaluationTask;
use super::treatment::{Treatment, TreatmentOutput};
use crate::config::HarnessConfig;

struct RegisteredTreatment {
    name: String,
    treatment: Box<dyn Treatment>,
}

/// Runs every task against every registered treatment
pub struct EvaluationHarness {
    config: HarnessConfig,
    treatments: Vec<RegisteredTreatment>,
    tasks: Vec<EvaluationTask>,
}

impl std::fmt::Debug for EvaluationHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationHarness")
            .field("treatments", &self.treatment_names())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Default for EvaluationHarness {
    fn default() -> Self {
        Self::new(HarnessConfig::default())
    }
}

impl EvaluationHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            treatments: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Register a treatment; a name already registered is replaced in place
    pub fn register_treatment(
        &mut self,
        name: impl Into<String>,
        treatment: impl Treatment + 'static,
    ) -> &mut Self {
        let name = name.into();
        let treatment: Box<dyn Treatment> = Box::new(treatment);
        match self.treatments.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                tracing::warn!(treatment = %name, "Replacing registered treatment");
                existing.treatment = treatment;
            }
            None => self.treatments.push(RegisteredTreatment { name, treatment }),
        }
        self
    }

    pub fn add_task(&mut self, task: EvaluationTask) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = EvaluationTask>) -> &mut Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn tasks(&self) -> &[EvaluationTask] {
        &self.tasks
    }

    pub fn treatment_names(&self) -> Vec<&str> {
        self.treatments.iter().map(|t| t.name.as_str()).collect()
    }

    /// Run all combinations and build the report. Always completes.
    pub async fn run(&mut self) -> EvaluationReport {
        let Self {
            config,
            treatments,
            tasks,
        } = self;

        tracing::info!(
            tasks = tasks.len(),
            treatments = treatments.len(),
            "Starting evaluation"
        );

        let mut runs = Vec::with_capacity(tasks.len() * treatments.len());
        for task in tasks.iter() {
            let timeout = task.timeout.unwrap_or(config.default_task_timeout);
            for registered in treatments.iter_mut() {
                let run =
                    run_one(&registered.name, registered.treatment.as_mut(), task, timeout).await;
                tracing::info!(
                    task = %run.task_id,
                    treatment = %run.treatment,
                    success = run.success,
                    duration_ms = run.duration_ms,
                    "Task finished"
                );
                runs.push(run);
            }
        }

        let names = treatments.iter().map(|t| t.name.clone()).collect();
        EvaluationReport::new(tasks, names, runs)
    }
}

async fn run_one(
    name: &str,
    treatment: &mut dyn Treatment,
    task: &EvaluationTask,
    timeout: Duration,
) -> EvaluationRun {
    let start = Instant::now();
    let attempt = AssertUnwindSafe(treatment.execute_task(task)).catch_unwind();
    let outcome = tokio::time::timeout(timeout, attempt).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let failed = |error: String| {
        tracing::error!(task = %task.id, treatment = name, %error, "Treatment failed");
        EvaluationRun {
            task_id: task.id.clone(),
            treatment: name.to_string(),
            success: false,
            duration_ms,
            tokens: Default::default(),
            calls: Default::default(),
            result: None,
            error: Some(error),
        }
    };

    match outcome {
        Ok(Ok(Ok(TreatmentOutput {
            result,
            tokens,
            calls,
        }))) => EvaluationRun {
            task_id: task.id.clone(),
            treatment: name.to_string(),
            success: task.is_success(&result),
            duration_ms,
            tokens,
            calls,
            result: Some(result),
            error: None,
        },
        Ok(Ok(Err(err))) => failed(err.to_string()),
        Ok(Err(panic)) => failed(format!("treatment panicked: {}", panic_message(&*panic))),
        Err(_) => failed(format!("task timed out after {:?}", timeout)),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
