//! Guardrail CLI - Command-line tools for guarded API execution

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use guardrail_core::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "guardrail")]
#[command(about = "Guarded execution of declaratively described HTTP operations", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, replacing the layered guardrail.toml,
    /// GUARDRAIL_CONFIG_PATH and GUARDRAIL_* lookup
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the operations in a document
    Ops {
        /// Operation document (JSON or YAML)
        document: PathBuf,
    },
    /// Print the tool manifest a model would be offered
    Manifest {
        /// Operation document (JSON or YAML)
        document: PathBuf,
    },
    /// Execute one operation through the guarded executor
    Call {
        /// Operation document (JSON or YAML)
        document: PathBuf,
        /// Operation id
        op_id: String,
        /// Argument object as JSON
        #[arg(short, long, default_value = "{}")]
        args: String,
        #[command(flatten)]
        target: Target,
        /// Print the metrics table after the call
        #[arg(long)]
        metrics: bool,
    },
    /// Compare treatments on a task file
    Eval {
        /// Operation document (JSON or YAML)
        document: PathBuf,
        /// Task file (JSON or YAML)
        tasks: PathBuf,
        #[command(flatten)]
        target: Target,
        /// LLM provider (openai, groq, ollama)
        #[arg(long)]
        provider: Option<String>,
        /// Model name
        #[arg(short, long)]
        model: Option<String>,
        /// Treatments to run
        #[arg(short, long, value_enum, default_value_t = TreatmentChoice::Both)]
        treatment: TreatmentChoice,
        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Version information
    Version,
}

#[derive(clap::Args)]
struct Target {
    /// Base URL, overriding configuration and the document
    #[arg(short, long)]
    base_url: Option<String>,
    /// Extra auth header as NAME=VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TreatmentChoice {
    ToolCalling,
    Baseline,
    Both,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name must not be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn load_config(path: Option<&Path>) -> Result<GuardrailConfig> {
    let config = match path {
        Some(path) => GuardrailConfig::from_file(path)?,
        None => GuardrailConfig::load()?,
    };
    Ok(config)
}

fn load_document(path: &Path) -> Result<OperationSet> {
    OperationSet::load(path)
        .with_context(|| format!("failed to load operation document {}", path.display()))
}

fn execution_context(
    config: &GuardrailConfig,
    target: Target,
    operations: &OperationSet,
) -> Result<ExecutionContext> {
    let mut executor_config = config.executor.clone();
    if let Some(base_url) = target.base_url {
        executor_config.base_url = Some(base_url);
    }
    executor_config.auth_headers.extend(target.headers);
    Ok(ExecutionContext::from_config(&executor_config, operations)?)
}

fn llm_config(
    config: &GuardrailConfig,
    provider: Option<String>,
    model: Option<String>,
) -> Result<LlmProviderConfig> {
    let provider = provider.map(|p| p.parse::<LlmProvider>()).transpose()?;
    let mut llm = match (config.llm.clone(), provider, model.clone()) {
        (Some(llm), _, _) => llm,
        (None, Some(provider), Some(model)) => LlmProviderConfig {
            provider,
            model,
            api_key: None,
            base_url: None,
            temperature: None,
        },
        (None, None, Some(model)) => LlmProviderConfig {
            provider: LlmProvider::OpenAI,
            model,
            api_key: None,
            base_url: None,
            temperature: None,
        },
        (None, _, None) => bail!("no model configured: pass --model or set [llm] in guardrail.toml"),
    };
    if let Some(provider) = provider {
        llm.provider = provider;
    }
    if let Some(model) = model {
        llm.model = model;
    }
    Ok(llm)
}

fn list_operations(operations: &OperationSet) {
    if let Some(title) = &operations.title {
        println!("{}", title);
    }
    for op in operations.iter() {
        let mut notes = Vec::new();
        if let Some(policy) = &op.guardrails {
            if let Some(retry) = &policy.retry {
                notes.push(format!("retry {} x{}", retry.strategy, retry.max_retries));
            }
            if let Some(timeout) = policy.timeout() {
                notes.push(format!("timeout {:?}", timeout));
            }
            if let Some(side_effect) = policy.side_effect {
                notes.push(side_effect.label().to_string());
            }
        }
        println!(
            "{:<24} {:<6} {:<32} {}{}",
            op.id,
            op.method,
            op.path,
            op.summary.as_deref().unwrap_or(""),
            if notes.is_empty() {
                String::new()
            } else {
                format!(" [{}]", notes.join(", "))
            }
        );
    }
}

async fn call(
    config: &GuardrailConfig,
    document: PathBuf,
    op_id: String,
    args: String,
    target: Target,
    show_metrics: bool,
) -> Result<()> {
    let operations = load_document(&document)?;
    let args: Value = serde_json::from_str(&args).context("--args must be valid JSON")?;
    let context = execution_context(config, target, &operations)?;
    let mut executor = GuardedExecutor::builder(operations, context)
        .metrics_enabled(config.executor.metrics_enabled || show_metrics)
        .build();

    let result = executor.call(&op_id, args).await;
    match &result {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                tracing::warn!(%warning, "Response does not match output schema");
            }
            let body = json!({
                "status": outcome.status,
                "retries": outcome.retries,
                "data": outcome.data,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Err(err) => {
            let body = json!({
                "code": err.code(),
                "message": err.to_string(),
                "retryable": err.is_retryable(),
                "status": err.status(),
                "retries": err.retries(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    if show_metrics {
        print!("\n{}", executor.export_metrics_table());
    }

    if let Err(err) = result {
        bail!("operation {} failed: {}", op_id, err.code());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn eval(
    config: &GuardrailConfig,
    document: PathBuf,
    tasks: PathBuf,
    target: Target,
    provider: Option<String>,
    model: Option<String>,
    treatment: TreatmentChoice,
    format: ReportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let operations = Arc::new(load_document(&document)?);
    let tasks = load_tasks(&tasks)
        .with_context(|| format!("failed to load tasks from {}", tasks.display()))?;
    let context = execution_context(config, target, &operations)?;
    let llm = llm_config(config, provider, model)?;
    let client = client_from_config(&llm)?;
    tracing::info!(provider = llm.provider.as_str(), model = %llm.model, "Using model");

    let mut harness = EvaluationHarness::new(config.harness.clone());
    if treatment != TreatmentChoice::Baseline {
        let executor = GuardedExecutor::builder(operations.clone(), context.clone())
            .metrics_enabled(config.executor.metrics_enabled)
            .build();
        harness.register_treatment(
            "tool-calling",
            ToolCallingTreatment::new(client.clone(), executor).with_config(&config.harness),
        );
    }
    if treatment != TreatmentChoice::ToolCalling {
        harness.register_treatment(
            "baseline",
            BaselineTreatment::new(
                client.clone(),
                Arc::new(ReqwestTransport::new()),
                operations.clone(),
                context,
            )
            .with_config(&config.harness),
        );
    }
    harness.add_tasks(tasks);

    let report = harness.run().await;
    let rendered = match format {
        ReportFormat::Json => report.to_json_pretty()?,
        ReportFormat::Markdown => report.to_markdown(),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("guardrail {}", env!("CARGO_PKG_VERSION"));
            println!("guardrail-core {}", guardrail_core::VERSION);
        }
        Commands::Ops { document } => list_operations(&load_document(&document)?),
        Commands::Manifest { document } => {
            let manifest = build_manifest(&load_document(&document)?);
            println!("{}", serde_json::to_string_pretty(manifest.tools())?);
        }
        Commands::Call {
            document,
            op_id,
            args,
            target,
            metrics,
        } => {
            let config = load_config(cli.config.as_deref())?;
            call(&config, document, op_id, args, target, metrics).await?;
        }
        Commands::Eval {
            document,
            tasks,
            target,
            provider,
            model,
            treatment,
            format,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            eval(
                &config, document, tasks, target, provider, model, treatment, format, output,
            )
            .await?;
        }
    }

    Ok(())
}
