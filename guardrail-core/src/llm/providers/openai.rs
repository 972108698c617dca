//! OpenAI-compatible chat-completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmProvider, LlmProviderConfig};
use crate::error::{GuardrailError, Result};
use crate::llm::{
    AssistantMessage, ChatClient, ChatMessage, ModelInfo, TokenUsage, ToolDefinition,
    ToolInvocation,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for any endpoint speaking the OpenAI chat-completions protocol
/// with function tools (OpenAI, Groq, Ollama).
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    provider: String,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleClient {
    /// Create a client for `model` at `base_url` (e.g. `http://localhost:11434/v1`).
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider: "openai-compatible".to_string(),
            api_key: None,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Create from provider configuration.
    ///
    /// The API key comes from the configuration, else from the provider's
    /// environment variable (`OPENAI_API_KEY`, `GROQ_API_KEY`).
    ///
    /// # Errors
    ///
    /// Returns an error if the provider needs a key and none is available.
    pub fn from_config(config: &LlmProviderConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string());

        let api_key = match (&config.api_key, config.provider.api_key_env()) {
            (Some(key), _) => Some(key.clone()),
            (None, Some(var)) => Some(std::env::var(var).map_err(|_| {
                GuardrailError::Configuration(format!("{} environment variable not set", var))
            })?),
            (None, None) => None,
        };

        let mut client = Self::new(&config.model, base_url)
            .with_provider_name(config.provider.as_str());
        client.api_key = api_key;
        if let Some(temperature) = config.temperature {
            client = client.with_temperature(temperature);
        }
        Ok(client)
    }

    /// Create from environment variables.
    ///
    /// Reads from:
    /// - `OPENAI_API_KEY` - API key (required)
    /// - `OPENAI_MODEL` - Model name (optional, defaults to "gpt-4o-mini")
    /// - `OPENAI_BASE_URL` - Custom base URL (optional)
    ///
    /// # Errors
    ///
    /// Returns an error if OPENAI_API_KEY is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GuardrailError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| LlmProvider::OpenAI.default_base_url().to_string());

        Ok(Self::new(model, base_url)
            .with_provider_name(LlmProvider::OpenAI.as_str())
            .with_api_key(api_key))
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Deserialize)]
struct WireErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunction {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect()
}

fn convert_response(response: WireResponse) -> Result<AssistantMessage> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(GuardrailError::Llm("API returned no choices".to_string()));
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let id = if call.id.is_empty() {
                format!("call_{}", i)
            } else {
                call.id
            };
            ToolInvocation::new(id, call.function.name, call.function.arguments)
        })
        .collect();

    Ok(AssistantMessage {
        content: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<AssistantMessage> {
        let request = WireRequest {
            model: &self.model,
            messages: convert_messages(messages),
            tools: tools.filter(|t| !t.is_empty()).map(convert_tools),
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            GuardrailError::Llm(format!("Failed to send request to {}: {}", self.provider, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if let Ok(error) = serde_json::from_str::<WireError>(&text) {
                return Err(GuardrailError::Llm(format!(
                    "{} API error ({}): {}",
                    self.provider,
                    error.error.error_type.unwrap_or_else(|| status.to_string()),
                    error.error.message
                )));
            }

            return Err(GuardrailError::Llm(format!(
                "{} API error ({}): {}",
                self.provider, status, text
            )));
        }

        let wire: WireResponse = response.json().await.map_err(|e| {
            GuardrailError::Llm(format!("Failed to parse {} response: {}", self.provider, e))
        })?;

        let message = convert_response(wire)?;
        tracing::debug!(
            model = %self.model,
            tool_calls = message.tool_calls.len(),
            total_tokens = message.usage.map(|u| u.total_tokens).unwrap_or_default(),
            "Chat completion received"
        );
        Ok(message)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.provider.clone(),
            model_name: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = OpenAiCompatibleClient::new("llama3.1", "http://localhost:11434/v1/");
        assert_eq!(client.model(), "llama3.1");
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_from_config_without_key_for_ollama() {
        let config = LlmProviderConfig {
            provider: LlmProvider::Ollama,
            model: "qwen2.5".to_string(),
            api_key: None,
            base_url: None,
            temperature: Some(5.0),
        };
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
        assert_eq!(client.temperature, Some(2.0));
        assert_eq!(client.model_info().provider, "ollama");
    }

    #[test]
    fn test_from_config_explicit_key() {
        let config = LlmProviderConfig {
            provider: LlmProvider::Groq,
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: Some("gsk-test".to_string()),
            base_url: None,
            temperature: None,
        };
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        assert_eq!(client.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(client.base_url(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_convert_messages_with_tool_round_trip() {
        let reply = AssistantMessage::tool_calls(vec![ToolInvocation::new(
            "call_9",
            "listItems",
            "{}",
        )]);
        let messages = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("List items"),
            ChatMessage::assistant(&reply),
            ChatMessage::tool_result("call_9", "[]"),
        ];

        let wire = serde_json::to_value(convert_messages(&messages)).unwrap();

        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire[2]["content"], serde_json::Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "listItems");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_9");
    }

    #[test]
    fn test_convert_response_with_tool_calls() {
        let wire: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "",
                        "type": "function",
                        "function": {"name": "getItem", "arguments": "{\"id\":3}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        }))
        .unwrap();

        let message = convert_response(wire).unwrap();
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].id, "call_0");
        assert_eq!(message.tool_calls[0].arguments, "{\"id\":3}");
        assert_eq!(message.usage.unwrap().total_tokens, 16);
    }

    #[test]
    fn test_convert_response_without_choices() {
        let wire: WireResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(convert_response(wire).is_err());
    }
}
