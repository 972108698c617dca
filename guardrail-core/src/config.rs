//! Configuration types for guardrail

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{GuardrailError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Executor configuration
    pub executor: ExecutorConfig,

    /// Evaluation harness configuration
    pub harness: HarnessConfig,

    /// LLM provider configuration (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmProviderConfig>,
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Base URL overriding the document's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Timeout for operations that declare none
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Session auth headers
    pub auth_headers: BTreeMap<String, String>,

    /// Keep execution records
    pub metrics_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_timeout: Duration::from_secs(30),
            auth_headers: BTreeMap::new(),
            metrics_enabled: true,
        }
    }
}

/// Evaluation harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Timeout for tasks that declare none
    #[serde(with = "humantime_serde")]
    pub default_task_timeout: Duration,

    /// Model round-trips allowed per task
    pub max_turns: usize,

    /// Cap on tools offered per task (all tools when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tools: Option<usize>,

    /// Tool results longer than this are truncated before reaching the model
    pub max_tool_result_chars: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            default_task_timeout: Duration::from_secs(120),
            max_turns: 8,
            max_tools: None,
            max_tool_result_chars: 4000,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type
    pub provider: LlmProvider,

    /// Model name
    pub model: String,

    /// API key (if needed, prefer env vars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// LLM provider type; all speak the OpenAI chat-completions protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Groq,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "openai",
            LlmProvider::Groq => "groq",
            LlmProvider::Ollama => "ollama",
        }
    }

    /// Default API base URL
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAI => "https://api.openai.com/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::Groq => Some("GROQ_API_KEY"),
            LlmProvider::Ollama => None,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = GuardrailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAI),
            "groq" => Ok(LlmProvider::Groq),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(GuardrailError::Configuration(format!(
                "unknown LLM provider: {}",
                other
            ))),
        }
    }
}

impl GuardrailConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `guardrail.toml` in the working directory
    /// 3. File named by `GUARDRAIL_CONFIG_PATH`
    /// 4. `GUARDRAIL_`-prefixed environment variables, nested keys split on
    ///    `__` (e.g. `GUARDRAIL_EXECUTOR__BASE_URL`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is malformed or the merged
    /// result is invalid.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(GuardrailConfig::default()))
            .merge(Toml::file("guardrail.toml"));

        if let Ok(path) = std::env::var("GUARDRAIL_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: GuardrailConfig = figment
            .merge(Env::prefixed("GUARDRAIL_").split("__").ignore(&["config_path"]))
            .extract()
            .map_err(|e| {
                GuardrailError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: GuardrailConfig =
            Figment::from(Serialized::defaults(GuardrailConfig::default()))
                .merge(Toml::file(path))
                .extract()
                .map_err(|e| {
                    GuardrailError::Configuration(format!(
                        "Failed to load configuration file: {}",
                        e
                    ))
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.executor.base_url {
            if base_url.trim().is_empty() {
                return Err(GuardrailError::Configuration(
                    "executor.base_url must not be empty".to_string(),
                ));
            }
        }
        if self.executor.default_timeout.is_zero() {
            return Err(GuardrailError::Configuration(
                "executor.default_timeout must be greater than zero".to_string(),
            ));
        }
        if self.harness.default_task_timeout.is_zero() {
            return Err(GuardrailError::Configuration(
                "harness.default_task_timeout must be greater than zero".to_string(),
            ));
        }
        if self.harness.max_turns == 0 {
            return Err(GuardrailError::Configuration(
                "harness.max_turns must be at least 1".to_string(),
            ));
        }
        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err(GuardrailError::Configuration(
                    "llm.model must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GuardrailConfig::default();
        assert_eq!(config.executor.default_timeout, Duration::from_secs(30));
        assert!(config.executor.metrics_enabled);
        assert_eq!(config.harness.max_turns, 8);
        assert!(config.llm.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[executor]
base_url = "http://localhost:8080"
default_timeout = "5s"

[executor.auth_headers]
Authorization = "Bearer test"

[harness]
max_turns = 3
default_task_timeout = "1m"

[llm]
provider = "ollama"
model = "llama3.1"
"#
        )
        .unwrap();

        let config = GuardrailConfig::from_file(file.path()).unwrap();
        assert_eq!(config.executor.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.executor.default_timeout, Duration::from_secs(5));
        assert_eq!(
            config.executor.auth_headers.get("Authorization").unwrap(),
            "Bearer test"
        );
        assert!(config.executor.metrics_enabled);
        assert_eq!(config.harness.max_turns, 3);
        assert_eq!(config.harness.default_task_timeout, Duration::from_secs(60));
        assert_eq!(config.harness.max_tool_result_chars, 4000);

        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Ollama);
        assert_eq!(llm.provider.default_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[harness]\nmax_turns = 0").unwrap();
        let err = GuardrailConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_turns"));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Groq".parse::<LlmProvider>().unwrap(), LlmProvider::Groq);
        assert!("anthropic".parse::<LlmProvider>().is_err());
    }
}
